//! URI templates with literal and named parameter segments.

use std::{fmt, str::FromStr};

/// Why a template string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    #[error("empty segment in template: {0:?}")]
    EmptySegment(String),
    #[error("malformed parameter in template: {0:?}")]
    MalformedParam(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A path pattern such as `/api/users/{id}`.
///
/// Literal segments must match a request path segment exactly; `{name}`
/// segments match any single non-empty segment and capture its value. A
/// template with more literal segments is considered more specific and wins
/// resolution over a parameterized sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if !raw.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(raw.to_string()));
        }

        let trimmed = &raw[1..];
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            for (index, part) in parts.iter().enumerate() {
                if part.is_empty() {
                    if index + 1 == parts.len() {
                        continue;
                    }
                    return Err(TemplateError::EmptySegment(raw.to_string()));
                }

                segments.push(parse_segment(part, raw)?);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of literal segments, the specificity measure.
    pub(crate) fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    /// Matches the template against a request's path segments, capturing
    /// parameter values in template order.
    pub(crate) fn matches(&self, path: &[&str]) -> Option<PathParams> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::default();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != value {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if value.is_empty() {
                        return None;
                    }
                    params.0.push((name.clone(), (*value).to_string()));
                }
            }
        }

        Some(params)
    }
}

fn parse_segment(part: &str, raw: &str) -> Result<Segment, TemplateError> {
    if let Some(inner) = part.strip_prefix('{') {
        let name = inner
            .strip_suffix('}')
            .ok_or_else(|| TemplateError::MalformedParam(raw.to_string()))?;
        if name.is_empty() || name.contains(['{', '}']) {
            return Err(TemplateError::MalformedParam(raw.to_string()));
        }
        return Ok(Segment::Param(name.to_string()));
    }

    if part.contains(['{', '}']) {
        return Err(TemplateError::MalformedParam(raw.to_string()));
    }
    Ok(Segment::Literal(part.to_string()))
}

impl FromStr for UriTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parameter values captured by a template match, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Value of the first parameter with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
