//! Rewriting of plugin download URLs.
//!
//! Mirrors and air-gapped installs redirect plugin downloads with an ordered
//! list of `regex=replacement` rules, written as one comma-separated string:
//!
//! ```text
//! ^github://api.github.com/iacpm=https://mirror.corp/iacpm,^https://get.iacpm.dev=https://cdn.corp
//! ```
//!
//! The first rule whose pattern matches rewrites the URL; later rules are not
//! consulted. Replacements may reference capture groups (`$1`, `${name}`).

use crate::core::IacpmError;
use anyhow::Result;
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct UrlOverrides {
    rules: Vec<(Regex, String)>,
}

impl UrlOverrides {
    /// Parses `regexp1=URL1,regexp2=URL2`. An empty string yields no rules.
    pub fn parse(input: &str) -> Result<Self> {
        let mut rules = Vec::new();
        if input.trim().is_empty() {
            return Ok(Self {
                rules,
            });
        }

        for pair in input.split(',') {
            let Some((pattern, replacement)) = pair.split_once('=') else {
                return Err(format_error(input));
            };
            if pattern.is_empty() {
                return Err(format_error(input));
            }
            let regex = Regex::new(pattern).map_err(|e| IacpmError::InvalidUrlOverrides {
                input: input.to_string(),
                reason: format!("invalid regular expression '{pattern}': {e}"),
            })?;
            rules.push((regex, replacement.to_string()));
        }

        Ok(Self {
            rules,
        })
    }

    /// Rewrites `url` with the first matching rule; unmatched URLs pass through.
    #[must_use]
    pub fn apply(&self, url: &str) -> String {
        for (regex, replacement) in &self.rules {
            if regex.is_match(url) {
                let rewritten = regex.replace_all(url, replacement.as_str()).into_owned();
                tracing::debug!(from = %url, to = %rewritten, "Applied download URL override");
                return rewritten;
            }
        }
        url.to_string()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

fn format_error(input: &str) -> anyhow::Error {
    IacpmError::InvalidUrlOverrides {
        input: input.to_string(),
        reason: format!(r#"expected format to be "regexp1=URL1,regexp2=URL2"; got "{input}""#),
    }
    .into()
}
