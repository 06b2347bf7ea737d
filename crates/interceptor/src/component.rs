use std::fmt;

/// Coarse architectural role of an instrumented type, used for log and trace labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Controller,
    Service,
    Repository,
    Gateway,
    Provider,
    Component,
}

const CLASSIFICATION_ORDER: [(&str, ComponentType); 5] = [
    ("controller", ComponentType::Controller),
    ("service", ComponentType::Service),
    ("repository", ComponentType::Repository),
    ("gateway", ComponentType::Gateway),
    ("provider", ComponentType::Provider),
];

impl ComponentType {
    /// Classify by case-insensitive substring match; the first rule that matches wins.
    pub fn classify(type_name: &str) -> Self {
        let lowered = type_name.to_lowercase();
        CLASSIFICATION_ORDER
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, component)| *component)
            .unwrap_or(ComponentType::Component)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Controller => "Controller",
            ComponentType::Service => "Service",
            ComponentType::Repository => "Repository",
            ComponentType::Gateway => "Gateway",
            ComponentType::Provider => "Provider",
            ComponentType::Component => "Component",
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
