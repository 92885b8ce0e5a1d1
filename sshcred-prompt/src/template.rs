use std::path::Path;

/// Values available to a prompt question.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Full key path.
    pub path: String,
    /// File name of the key.
    pub name: String,
}

impl PromptContext {
    pub fn for_key(path: &Path) -> Self {
        Self {
            path: path.display().to_string(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "path" => Some(self.path.as_str()),
            "name" => Some(self.name.as_str()),
            _ => None,
        }
    }
}

/// Substitute `{{path}}` and `{{name}}`; unknown or unterminated placeholders
/// are kept as-is.
pub fn render_template(template: &str, context: &PromptContext) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        output.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };
        let placeholder = &rest[open..open + 2 + close + 2];
        match context.lookup(after[..close].trim()) {
            Some(value) => output.push_str(value),
            None => output.push_str(placeholder),
        }
        rest = &after[close + 2..];
    }
    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_path_and_name() {
        let ctx = PromptContext::for_key(Path::new("/home/me/.ssh/id_rsa"));
        assert_eq!(
            render_template("Passphrase for {{name}} ({{ path }}): ", &ctx),
            "Passphrase for id_rsa (/home/me/.ssh/id_rsa): "
        );
    }

    #[test]
    fn leaves_unknown_placeholders() {
        let ctx = PromptContext::default();
        assert_eq!(render_template("{{unknown}}", &ctx), "{{unknown}}");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let ctx = PromptContext::for_key(Path::new("k"));
        assert_eq!(render_template("{{name}} {{name", &ctx), "k {{name");
    }

    #[test]
    fn single_braces_are_literal() {
        let ctx = PromptContext::for_key(Path::new("k"));
        assert_eq!(render_template("{name} {{name}}", &ctx), "{name} k");
    }
}
