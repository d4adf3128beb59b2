//! Static export of configuration trees
//!
//! Exporting produces a tree that can be stored and loaded later without the
//! original sources. Placeholders whose resolver is not exportable (`conf`)
//! are inlined. Exportable ones (`env`, `const`, `global`) must stay dynamic,
//! so they are written out as their static expression, which is the
//! placeholder in canonical form.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::placeholder::PlaceholderMatcher;
use crate::processor::{ConfigProcessor, PlaceholderEngine};
use crate::resolver::{ResolverContext, ResolverRegistry};
use crate::value::Value;

/// Exports trees with environment dependent placeholders kept in place
#[derive(Debug, Clone)]
pub struct ConfigExporter {
    registry: ResolverRegistry,
}

impl Default for ConfigExporter {
    fn default() -> Self {
        Self::new(ResolverRegistry::with_builtins())
    }
}

impl ConfigExporter {
    pub fn new(registry: ResolverRegistry) -> Self {
        Self { registry }
    }

    pub fn from_context(ctx: &ResolverContext) -> Self {
        Self::new(ResolverRegistry::from_context(ctx))
    }

    /// Inline what can be inlined and keep the rest as static expressions
    pub fn export(&self, tree: &Value) -> Result<Value> {
        let inline = self.registry.filtered(|r| !r.exportable());
        let inlined = if inline.is_empty() {
            tree.clone()
        } else {
            PlaceholderEngine::new(inline, false).process_config(tree.clone())?
        };

        let exportable = self.registry.filtered(|r| r.exportable());
        let matcher = PlaceholderMatcher::new(Some(exportable.supported_types()));
        Ok(self.to_static(&inlined, &inlined, &matcher))
    }

    /// [`export`](Self::export) rendered as YAML
    pub fn export_yaml(&self, tree: &Value) -> Result<String> {
        let exported = self.export(tree)?;
        serde_yaml::to_string(&exported)
            .map_err(|e| Error::internal(format!("Failed to serialize export: {}", e)))
    }

    fn to_static(&self, value: &Value, reference: &Value, matcher: &PlaceholderMatcher) -> Value {
        match value {
            Value::String(s) => Value::String(self.static_text(s, reference, matcher)),
            Value::Mapping(map) => Value::Mapping(
                map.iter()
                    .map(|(k, v)| {
                        (
                            self.static_text(k, reference, matcher),
                            self.to_static(v, reference, matcher),
                        )
                    })
                    .collect::<IndexMap<_, _>>(),
            ),
            Value::Sequence(seq) => Value::Sequence(
                seq.iter()
                    .map(|v| self.to_static(v, reference, matcher))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn static_text(&self, s: &str, reference: &Value, matcher: &PlaceholderMatcher) -> String {
        let Ok(matches) = matcher.extract_all(s, None) else {
            return s.to_string();
        };

        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for m in &matches {
            out.push_str(&s[last..m.span.start]);
            let expression = self
                .registry
                .resolver_for(&m.placeholder_type)
                .and_then(|r| r.resolve_as_static_expression(m, reference))
                .unwrap_or_else(|| m.raw.clone());
            out.push_str(&expression);
            last = m.span.end;
        }
        out.push_str(&s[last..]);
        out
    }
}
