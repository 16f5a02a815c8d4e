/// Replace `${ENV_VAR}` placeholders in raw config text before parsing.
///
/// Unset variables and unterminated placeholders are left untouched so the
/// parser reports them in context.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match lookup(name) {
            Some(value) if !name.is_empty() => out.push_str(&value),
            _ => out.push_str(&rest[start..start + 3 + end]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        let lookup = |name: &str| (name == "ACKBRIDGE_SUBST_VAR").then(|| "hello".to_string());
        assert_eq!(
            substitute_with("client_id = \"${ACKBRIDGE_SUBST_VAR}\"", lookup),
            "client_id = \"hello\""
        );
    }

    #[test]
    fn substitutes_every_placeholder() {
        let lookup = |name: &str| Some(name.to_lowercase());
        assert_eq!(substitute_with("${A}-${B}/${}", lookup), "a-b/${}");
    }

    #[test]
    fn leaves_unknown_var() {
        assert_eq!(
            substitute_env("${ACKBRIDGE_NONEXISTENT_XYZ}"),
            "${ACKBRIDGE_NONEXISTENT_XYZ}"
        );
    }

    #[test]
    fn no_placeholders() {
        assert_eq!(substitute_env("port = 8001"), "port = 8001");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        assert_eq!(substitute_env("id = \"${BROKEN"), "id = \"${BROKEN");
    }
}
