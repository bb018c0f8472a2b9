//! Logging context handed to every handler and orchestrator.
//!
//! The library never installs a subscriber. The process entry point builds
//! one `LogContext`, and each component run narrows it with
//! [`LogContext::for_component`] so every event carries the component name.

use tracing::span::Entered;
use tracing::Span;

#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
    print_templates: bool,
}

impl Default for LogContext {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LogContext {
    pub fn new(print_templates: bool) -> Self {
        Self {
            span: Span::none(),
            print_templates,
        }
    }

    /// Child context scoped to one component.
    ///
    /// A root context has no span of its own, so the component span nests
    /// under whatever span is current at the call site.
    pub fn for_component(&self, name: &str) -> Self {
        let span = if self.span.is_none() {
            tracing::info_span!("component", name = %name)
        } else {
            tracing::info_span!(parent: &self.span, "component", name = %name)
        };
        Self {
            span,
            print_templates: self.print_templates,
        }
    }

    /// Enter the context's span for the lifetime of the guard.
    pub fn enter(&self) -> Entered<'_> {
        self.span.enter()
    }

    /// Whether rendered template content is echoed at debug level.
    pub fn print_templates(&self) -> bool {
        self.print_templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_component_events_reach_the_callers_scope() {
        let log = LogContext::new(false).for_component("nginx");
        {
            let _span = log.enter();
            tracing::info!("inside component");
        }
        assert!(logs_contain("inside component"));
        assert!(logs_contain("name=nginx"));
    }

    #[test]
    #[traced_test]
    fn test_nested_component_keeps_parent() {
        let outer = LogContext::new(false).for_component("outer");
        let inner = outer.for_component("inner");
        {
            let _span = inner.enter();
            tracing::info!("nested event");
        }
        assert!(logs_contain("component{name=outer}:component{name=inner}"));
    }
}
