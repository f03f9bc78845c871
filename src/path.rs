//! Dotted path addressing into a synth graph
//!
//! `"carrier.freq.mul"` names the `mul` input of the node feeding the `freq`
//! input of the node registered as `carrier`. The long form spells out the
//! implicit separators: `"carrier.inputs.freq.inputs.mul"`.
//!
//! - `model` switches to the node's private model; the next segment is a field.
//! - `options` switches to the node's options; later segments are literal keys.
//! - Numeric segments index multi-node inputs and arrays.

use crate::error::{Error, Result};

pub const INPUTS: &str = "inputs";
pub const MODEL: &str = "model";
pub const OPTIONS: &str = "options";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Named input (or object key inside a literal)
    Input(String),
    /// Element of a multi-node input or array
    Index(usize),
    /// Field of the private model
    Model(String),
    /// Key chain into the options map (empty for the whole map)
    Options(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    /// Name of the node the path starts at
    pub root: String,
    pub segments: Vec<Segment>,
}

impl Path {
    pub fn parse(path: &str) -> Result<Self> {
        let mut parts = path.split('.');
        let root = match parts.next() {
            Some(root) if !root.is_empty() => root.to_string(),
            _ => return Err(Error::InvalidPath(path.to_string())),
        };

        let mut segments = Vec::new();
        while let Some(part) = parts.next() {
            if part.is_empty() {
                return Err(Error::InvalidPath(path.to_string()));
            }
            match part {
                INPUTS => continue,
                MODEL => {
                    let field = parts
                        .next()
                        .filter(|f| !f.is_empty())
                        .ok_or_else(|| Error::InvalidPath(path.to_string()))?;
                    if parts.next().is_some() {
                        return Err(Error::InvalidPath(path.to_string()));
                    }
                    segments.push(Segment::Model(field.to_string()));
                }
                OPTIONS => {
                    let keys: Vec<String> = parts.by_ref().map(str::to_string).collect();
                    if keys.iter().any(String::is_empty) {
                        return Err(Error::InvalidPath(path.to_string()));
                    }
                    segments.push(Segment::Options(keys));
                }
                _ => match part.parse::<usize>() {
                    Ok(index) => segments.push(Segment::Index(index)),
                    Err(_) => segments.push(Segment::Input(part.to_string())),
                },
            }
        }

        Ok(Self { root, segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_forms() {
        let short = Path::parse("carrier.freq.mul").unwrap();
        let long = Path::parse("carrier.inputs.freq.inputs.mul").unwrap();
        assert_eq!(short, long);
        assert_eq!(short.root, "carrier");
        assert_eq!(
            short.segments,
            vec![
                Segment::Input("freq".to_string()),
                Segment::Input("mul".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_model_options_and_index() {
        let path = Path::parse("osc.model.phase").unwrap();
        assert_eq!(path.segments, vec![Segment::Model("phase".to_string())]);

        let path = Path::parse("osc.options.interpolation").unwrap();
        assert_eq!(
            path.segments,
            vec![Segment::Options(vec!["interpolation".to_string()])]
        );

        let path = Path::parse("mix.sources.1.freq").unwrap();
        assert_eq!(
            path.segments,
            vec![
                Segment::Input("sources".to_string()),
                Segment::Index(1),
                Segment::Input("freq".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("osc..freq").is_err());
        assert!(Path::parse("osc.model").is_err());
        assert!(Path::parse("osc.model.a.b").is_err());
    }
}
