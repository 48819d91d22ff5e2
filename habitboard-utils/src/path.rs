use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard(String),
}

/// Slash-separated document path pattern such as `users/{uid}/habits/{hid}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentPattern {
    segments: Vec<Segment>,
}

impl DocumentPattern {
    pub fn parse(pattern: &str) -> anyhow::Result<Self> {
        let pattern = pattern.trim().trim_matches('/');
        if pattern.is_empty() {
            anyhow::bail!("document pattern is empty");
        }

        let mut segments = Vec::new();
        for raw in pattern.split('/') {
            if raw.is_empty() {
                anyhow::bail!("document pattern `{pattern}` has an empty segment");
            }

            let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if name.is_empty() => {
                    anyhow::bail!("document pattern `{pattern}` has an unnamed wildcard")
                }
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Wildcard(existing) if existing == name));
                    if duplicate {
                        anyhow::bail!("document pattern `{pattern}` repeats wildcard `{name}`");
                    }
                    Segment::Wildcard(name.to_owned())
                }
                None => Segment::Literal(raw.to_owned()),
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    /// Bind wildcard names to the matching segments of `path`.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = path.trim_matches('/').split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Wildcard(_) if part.is_empty() => return None,
                Segment::Wildcard(name) => {
                    params.insert(name.clone(), part.to_owned());
                }
            }
        }

        Some(params)
    }

    pub fn wildcards(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Wildcard(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl FromStr for DocumentPattern {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            match segment {
                Segment::Literal(literal) => f.write_str(literal)?,
                Segment::Wildcard(name) => write!(f, "{{{name}}}")?,
            }
        }
        Ok(())
    }
}
