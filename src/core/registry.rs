use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::core::error::{ImportError, ImportResult};
use crate::core::mapping::MappingType;
use crate::core::step::{BoxedStep, StepDescriptor};

/// Steps of one phase, in registration order.
#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<BoxedStep>,
}

/// Order in which registered steps run, plus the mapping types they need
/// from an earlier run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub order: Vec<&'static StepDescriptor>,
    /// `(step, type)` pairs where no registered step produces `type`
    pub external: Vec<(&'static str, MappingType)>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step; names and produced types must be unique.
    pub fn register(&mut self, step: BoxedStep) -> ImportResult<()> {
        let descriptor = step.descriptor();
        for existing in self.descriptors() {
            if existing.name == descriptor.name {
                return Err(ImportError::DuplicateStep(descriptor.name.to_string()));
            }
            if let (Some(mapping_type), Some(other)) = (descriptor.produces, existing.produces) {
                if mapping_type == other {
                    return Err(ImportError::DuplicateProducer {
                        mapping_type,
                        first: existing.name.to_string(),
                        second: descriptor.name.to_string(),
                    });
                }
            }
        }
        tracing::debug!("Registered step '{}'", descriptor.name);
        self.steps.push(step);
        Ok(())
    }

    /// Keep only the steps whose name satisfies `keep`.
    pub fn retain<F: Fn(&str) -> bool>(&mut self, keep: F) {
        self.steps.retain(|step| keep(step.descriptor().name));
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors().map(|d| d.name).collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static StepDescriptor> + '_ {
        self.steps.iter().map(|step| step.descriptor())
    }

    pub fn plan(&self) -> ImportResult<ExecutionPlan> {
        let descriptors: Vec<_> = self.descriptors().collect();
        plan(&descriptors)
    }

    /// Consume the registry, returning steps sorted by `plan`.
    pub fn into_ordered(self, plan: &ExecutionPlan) -> Vec<BoxedStep> {
        let mut by_name: HashMap<&'static str, BoxedStep> = self
            .steps
            .into_iter()
            .map(|step| (step.descriptor().name, step))
            .collect();
        plan.order
            .iter()
            .filter_map(|descriptor| by_name.remove(descriptor.name))
            .collect()
    }
}

/// Order `descriptors` so every producer of a type runs before the steps that
/// depend on it or are ordered after it. Fails on a cycle before anything runs.
///
/// Only `depends_on` types without a producer are reported as external.
pub fn plan(descriptors: &[&'static StepDescriptor]) -> ImportResult<ExecutionPlan> {
    let mut graph: DiGraph<&'static StepDescriptor, ()> = DiGraph::new();
    let mut producers: HashMap<MappingType, NodeIndex> = HashMap::new();
    let nodes: Vec<NodeIndex> = descriptors
        .iter()
        .map(|descriptor| {
            let node = graph.add_node(*descriptor);
            if let Some(mapping_type) = descriptor.produces {
                producers.insert(mapping_type, node);
            }
            node
        })
        .collect();

    let mut external = Vec::new();
    for (descriptor, &node) in descriptors.iter().zip(&nodes) {
        for mapping_type in descriptor.depends_on {
            match producers.get(mapping_type) {
                Some(&producer) => {
                    graph.add_edge(producer, node, ());
                }
                None => external.push((descriptor.name, *mapping_type)),
            }
        }
        for mapping_type in descriptor.ordered_after {
            if let Some(&producer) = producers.get(mapping_type) {
                graph.add_edge(producer, node, ());
            }
        }
    }

    let sorted = toposort(&graph, None)
        .map_err(|cycle| ImportError::DependencyCycle(graph[cycle.node_id()].name.to_string()))?;

    Ok(ExecutionPlan {
        order: sorted.into_iter().map(|node| graph[node]).collect(),
        external,
    })
}
