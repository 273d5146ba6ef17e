//! Command template tokenizer.
//!
//! A template is split once into literal text and `<...>` placeholders.
//! A placeholder runs from a `<` to the next `>` on the same line; a `<`
//! with no closing `>` before the end of the line stays literal text.

/// Raw piece of a template, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Immutable, tokenized command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let segments = tokenize(&source);
        Self { source, segments }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in order of appearance, repeats included.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders().any(|p| p == name)
    }
}

fn tokenize(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    while let Some(rel) = source[pos..].find('<') {
        let open = pos + rel;
        let name_start = open + 1;
        match source[name_start..].find(['>', '\n']) {
            Some(rel) if source.as_bytes()[name_start + rel] == b'>' => {
                let close = name_start + rel;
                if open > literal_start {
                    segments.push(Segment::Literal(source[literal_start..open].to_string()));
                }
                segments.push(Segment::Placeholder(source[name_start..close].to_string()));
                pos = close + 1;
                literal_start = pos;
            }
            // line ended first; nothing between here and the newline can close
            Some(rel) => pos = name_start + rel,
            None => break,
        }
    }

    if literal_start < source.len() {
        segments.push(Segment::Literal(source[literal_start..].to_string()));
    }
    segments
}
