//! Hierarchical parameter names.
//!
//! Every layer receives its scope explicitly. A `NamePath` is a list of segments joined with
//! `/`; parameters append `-{kind}` to the last segment:
//!
//! ```rust
//! use inception_rs::names::NamePath;
//!
//! let conv = NamePath::root("InceptionV3").child("mixed_4").child("branch7x7").child("conv1");
//! assert_eq!(conv.param("weight"), "InceptionV3/mixed_4/branch7x7/conv1-weight");
//! assert_eq!(conv.with_suffix("_bn").param("gamma"), "InceptionV3/mixed_4/branch7x7/conv1_bn-gamma");
//! ```

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NamePath {
    segments: Vec<String>,
}

impl NamePath {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// A path with no segments. Children of an empty path start at the top level.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Extends the path by one segment.
    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.as_ref().to_string());
        Self { segments }
    }

    /// Appends `suffix` to the last segment (`conv0` becomes `conv0_bn`).
    pub fn with_suffix(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        match segments.last_mut() {
            Some(last) => last.push_str(suffix),
            None => segments.push(suffix.to_string()),
        }
        Self { segments }
    }

    /// Full name of the parameter `kind` owned by this path, e.g. `…/conv0-weight`.
    pub fn param(&self, kind: &str) -> String {
        format!("{self}-{kind}")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_does_not_mutate_parent() {
        let root = NamePath::root("InceptionV3");
        let block = root.child("mixed_0");
        assert_eq!(root.to_string(), "InceptionV3");
        assert_eq!(block.to_string(), "InceptionV3/mixed_0");
        assert_eq!(block.last(), Some("mixed_0"));
    }

    #[test]
    fn test_param_names() {
        let conv = NamePath::root("InceptionV3").child("conv0");
        assert_eq!(conv.param("weight"), "InceptionV3/conv0-weight");
        assert_eq!(conv.param("bias"), "InceptionV3/conv0-bias");
        assert_eq!(
            conv.with_suffix("_bn").param("moving_mean"),
            "InceptionV3/conv0_bn-moving_mean"
        );
    }

    #[test]
    fn test_empty_path() {
        let p = NamePath::empty().child("fc1");
        assert_eq!(p.param("weight"), "fc1-weight");
        assert_eq!(NamePath::empty().with_suffix("x").segments(), &["x".to_string()]);
    }
}
