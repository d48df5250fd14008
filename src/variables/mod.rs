use std::collections::HashMap;

/// Opening of a variable token.
const OPEN: &str = "@{";
/// Closing of a variable token.
const CLOSE: char = '}';
/// Variable name bound to the logged-in user.
pub const USER_VARIABLE: &str = "user";

/// Resolves `@{name}` placeholders against request headers and the
/// logged-in user.
///
/// Headers are looked up case-insensitively and take precedence over the
/// `user` variable. Resolution is all or nothing: one unknown variable makes
/// the whole template unresolvable.
#[derive(Debug, Clone, Default)]
pub struct VariablesManager {
    headers: HashMap<String, String>,
    user: Option<String>,
}

impl VariablesManager {
    pub fn new<'a, I>(
        headers: I,
        user: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            user: user.map(str::to_string),
        }
    }

    /// Substitutes every variable in `template`.
    ///
    /// Returns `None` if a variable is unknown or a token is not closed.
    pub fn resolve(
        &self,
        template: &str,
    ) -> Option<String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE)?;
            let value = self.lookup(&after_open[..end])?;
            out.push_str(value);
            rest = &after_open[end + CLOSE.len_utf8()..];
        }

        out.push_str(rest);
        Some(out)
    }

    /// Resolves every template, silently dropping the unresolvable ones.
    pub fn resolve_all<'a, I>(
        &self,
        templates: I,
    ) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        templates
            .into_iter()
            .filter_map(|t| self.resolve(t))
            .collect()
    }

    fn lookup(
        &self,
        name: &str,
    ) -> Option<&str> {
        if let Some(value) = self.headers.get(&name.to_lowercase()) {
            return Some(value.as_str());
        }
        if name == USER_VARIABLE {
            return self.user.as_deref();
        }
        None
    }
}

/// Whether `value` contains at least one variable token.
pub fn contains_variables(value: &str) -> bool {
    value.contains(OPEN)
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
