//! Context providers - device/session metadata attached to every payload

use contracts::Properties;
use serde_json::json;

/// Supplies the `context` map of each payload.
///
/// Called once per event on the caller's thread; implementations should
/// return quickly.
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> Properties;
}

/// Library and OS information only
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    library_name: String,
    library_version: String,
}

impl DefaultContextProvider {
    pub fn new(library_name: impl Into<String>, library_version: impl Into<String>) -> Self {
        Self {
            library_name: library_name.into(),
            library_version: library_version.into(),
        }
    }
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self::new("analytics-rust", env!("CARGO_PKG_VERSION"))
    }
}

impl ContextProvider for DefaultContextProvider {
    fn context(&self) -> Properties {
        let mut context = Properties::new();
        context.insert(
            "library".into(),
            json!({ "name": self.library_name, "version": self.library_version }),
        );
        context.insert(
            "os".into(),
            json!({ "name": std::env::consts::OS, "arch": std::env::consts::ARCH }),
        );
        context
    }
}

impl<F> ContextProvider for F
where
    F: Fn() -> Properties + Send + Sync,
{
    fn context(&self) -> Properties {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context() {
        let context = DefaultContextProvider::default().context();
        assert_eq!(context["library"]["name"], "analytics-rust");
        assert_eq!(context["os"]["name"], std::env::consts::OS);
    }

    #[test]
    fn test_closure_provider() {
        let provider = || {
            let mut context = Properties::new();
            context.insert("locale".into(), "en-US".into());
            context
        };
        assert_eq!(provider.context()["locale"], "en-US");
    }
}
