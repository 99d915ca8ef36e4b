//! 模板渲染：`{{ name }}` 占位符替换
//!
//! 纯函数，无 I/O。未知变量原样保留，未闭合的 `{{` 视为错误。

use std::collections::HashMap;

pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, variables: &HashMap<String, String>) -> Result<String, String>;
}

/// 默认渲染器
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, variables: &HashMap<String, String>) -> Result<String, String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                let offset = template.len() - rest.len() + start;
                return Err(format!("unclosed placeholder at byte {offset}"));
            };
            let raw = &after[..end];
            match variables.get(raw.trim()) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(raw);
                    out.push_str("}}");
                }
            }
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("name".to_string(), "Billing".to_string()),
            ("goal".to_string(), "Handle invoices".to_string()),
        ])
    }

    #[test]
    fn test_replaces_known_placeholders() {
        let out = PlaceholderRenderer
            .render("You are {{name}}. Goal: {{ goal }}.", &vars())
            .unwrap();
        assert_eq!(out, "You are Billing. Goal: Handle invoices.");
    }

    #[test]
    fn test_keeps_unknown_and_plain_braces() {
        let out = PlaceholderRenderer
            .render("{{missing}} and {json: 1}", &vars())
            .unwrap();
        assert_eq!(out, "{{missing}} and {json: 1}");
    }

    #[test]
    fn test_unclosed_placeholder_is_an_error() {
        let err = PlaceholderRenderer.render("Hi {{name", &vars()).unwrap_err();
        assert!(err.contains("byte 3"));
    }
}
