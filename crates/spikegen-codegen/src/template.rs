//! Whole-program templates.
//!
//! Template text is plain text with slots:
//!
//! - `{{name}}` is a required slot, `{{name?}}` an optional one.
//! - A slot alone on its line is replaced line by line, each value line
//!   keeping the slot's indentation. If the value is empty (or an optional
//!   slot has no value) the line disappears.
//! - `@@ section <name>` starts a new named section of the artifact.
//! - `@@ iterate_all <true|false>` and `@@ kernel <state_update|threshold|reset> [subset]`
//!   set template metadata.
//!
//! Lines before the first `@@ section` belong to a section named `main`.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::TemplateError;
use crate::language::Keywords;

type Result<T> = std::result::Result<T, TemplateError>;

/// Section name used when a template declares none.
pub const MAIN_SECTION: &str = "main";

/// What the in-process runtime does around the per-index code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RuntimeKernel {
    /// Run the code for every index.
    #[default]
    StateUpdate,
    /// Run the code for every index and collect those where `_cond` holds.
    Threshold,
    /// Run the code only for the indices stored in the `subset` array.
    Reset { subset: String },
}

/// Metadata declared by a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMeta {
    /// The template visits every index densely.
    pub iterate_all: bool,
    pub kernel: RuntimeKernel,
}

impl Default for TemplateMeta {
    fn default() -> Self {
        Self {
            iterate_all: true,
            kernel: RuntimeKernel::StateUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SlotRef {
    name: String,
    optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    Slot(SlotRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Text(Vec<Piece>),
    /// A slot alone on its line.
    Block { indent: String, slot: SlotRef },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    lines: Vec<Line>,
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    sections: Vec<Section>,
    meta: TemplateMeta,
}

impl Template {
    /// Parse and validate template text.
    pub fn parse(name: &str, text: &str) -> Result<Template> {
        let mut sections: Vec<Section> = Vec::new();
        let mut meta = TemplateMeta::default();

        for (i, raw) in text.lines().enumerate() {
            let lineno = i + 1;
            if let Some(directive) = raw.trim_start().strip_prefix("@@") {
                apply_directive(name, lineno, directive.trim(), &mut sections, &mut meta)?;
                continue;
            }
            let line = parse_line(name, lineno, raw)?;
            match sections.last_mut() {
                Some(section) => section.lines.push(line),
                None => {
                    if raw.trim().is_empty() {
                        continue;
                    }
                    sections.push(Section {
                        name: MAIN_SECTION.to_string(),
                        lines: vec![line],
                    });
                }
            }
        }

        Ok(Template {
            name: name.to_string(),
            sections,
            meta,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn meta(&self) -> &TemplateMeta {
        &self.meta
    }

    /// Section names in declaration order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Fill every slot from `keywords`.
    pub fn render(&self, keywords: &Keywords) -> Result<Artifact> {
        let mut artifact = Artifact::default();
        for section in &self.sections {
            let mut out: Vec<String> = Vec::new();
            for line in &section.lines {
                match line {
                    Line::Block { indent, slot } => {
                        let value = self.lookup(keywords, slot)?;
                        if value.is_empty() {
                            continue;
                        }
                        for value_line in value.lines() {
                            if value_line.is_empty() {
                                out.push(String::new());
                            } else {
                                out.push(format!("{indent}{value_line}"));
                            }
                        }
                    }
                    Line::Text(pieces) => {
                        let mut text = String::new();
                        for piece in pieces {
                            match piece {
                                Piece::Text(t) => text.push_str(t),
                                Piece::Slot(slot) => text.push_str(self.lookup(keywords, slot)?),
                            }
                        }
                        out.push(text);
                    }
                }
            }
            let mut body = out.join("\n");
            body.push('\n');
            artifact.sections.insert(section.name.clone(), body);
        }
        Ok(artifact)
    }

    fn lookup<'k>(&self, keywords: &'k Keywords, slot: &SlotRef) -> Result<&'k str> {
        match keywords.get(&slot.name) {
            Some(value) => Ok(value.as_str()),
            None if slot.optional => Ok(""),
            None => Err(TemplateError::MissingSlot {
                template: self.name.clone(),
                slot: slot.name.clone(),
            }),
        }
    }
}

fn apply_directive(
    template: &str,
    line: usize,
    directive: &str,
    sections: &mut Vec<Section>,
    meta: &mut TemplateMeta,
) -> Result<()> {
    let invalid = |detail: String| TemplateError::InvalidDirective {
        template: template.to_string(),
        line,
        detail,
    };
    let mut words = directive.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("section"), Some(name), None) => {
            if sections.iter().any(|s| s.name == name) {
                return Err(TemplateError::DuplicateSection {
                    template: template.to_string(),
                    section: name.to_string(),
                });
            }
            sections.push(Section {
                name: name.to_string(),
                lines: Vec::new(),
            });
        }
        (Some("iterate_all"), Some(value), None) => {
            meta.iterate_all = value
                .parse()
                .map_err(|_| invalid(format!("iterate_all expects true or false, got '{value}'")))?;
        }
        (Some("kernel"), Some("state_update"), None) => meta.kernel = RuntimeKernel::StateUpdate,
        (Some("kernel"), Some("threshold"), None) => meta.kernel = RuntimeKernel::Threshold,
        (Some("kernel"), Some("reset"), Some(subset)) => {
            meta.kernel = RuntimeKernel::Reset {
                subset: subset.to_string(),
            };
        }
        _ => return Err(invalid(format!("unrecognised directive '@@ {directive}'"))),
    }
    Ok(())
}

fn parse_line(template: &str, line: usize, raw: &str) -> Result<Line> {
    let malformed = |detail: String| TemplateError::MalformedSlot {
        template: template.to_string(),
        line,
        detail,
    };

    let mut pieces = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            pieces.push(Piece::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| malformed("unterminated '{{'".to_string()))?;
        let inner = after[..end].trim();
        let (name, optional) = match inner.strip_suffix('?') {
            Some(name) => (name.trim_end(), true),
            None => (inner, false),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(malformed(format!("invalid slot name '{inner}'")));
        }
        pieces.push(Piece::Slot(SlotRef {
            name: name.to_string(),
            optional,
        }));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }

    // A slot with only whitespace around it expands line by line.
    let indent_len = raw.len() - raw.trim_start().len();
    match pieces.as_slice() {
        [Piece::Slot(slot)] if indent_len == 0 => Ok(Line::Block {
            indent: String::new(),
            slot: slot.clone(),
        }),
        [Piece::Text(indent), Piece::Slot(slot)] if indent.trim().is_empty() => Ok(Line::Block {
            indent: indent.clone(),
            slot: slot.clone(),
        }),
        [Piece::Text(indent), Piece::Slot(slot), Piece::Text(tail)]
            if indent.trim().is_empty() && tail.trim().is_empty() =>
        {
            Ok(Line::Block {
                indent: indent.clone(),
                slot: slot.clone(),
            })
        }
        [Piece::Slot(slot), Piece::Text(tail)] if tail.trim().is_empty() => Ok(Line::Block {
            indent: String::new(),
            slot: slot.clone(),
        }),
        _ => Ok(Line::Text(pieces)),
    }
}

/// Rendered template output: ordered named sections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    sections: IndexMap<String, String>,
}

impl Artifact {
    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections.get(name).map(String::as_str)
    }

    /// The first section.
    pub fn main(&self) -> Option<&str> {
        self.sections.values().next().map(String::as_str)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sections.len() == 1 {
            if let Some(text) = self.main() {
                return f.write_str(text);
            }
        }
        for (name, text) in &self.sections {
            writeln!(f, "@@ section {name}")?;
            f.write_str(text)?;
        }
        Ok(())
    }
}

/// A named set of templates.
#[derive(Debug, Clone, Default)]
pub struct Templater {
    templates: IndexMap<String, Template>,
}

impl Templater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `(name, text)` pairs, typically `include_str!` contents.
    pub fn from_sources<'a, I>(sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut templater = Templater::new();
        for (name, text) in sources {
            templater.insert(Template::parse(name, text)?);
        }
        Ok(templater)
    }

    /// Load every `*.tmpl` file in `dir`; the file stem is the template name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let io_err = |path: &Path, source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
            let path = entry.map_err(|e| io_err(dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == "tmpl") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templater = Templater::new();
        for path in paths {
            let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            templater.insert(Template::parse(&name, &text)?);
        }
        Ok(templater)
    }

    /// Add a template, replacing any with the same name.
    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(pairs: &[(&str, &str)]) -> Keywords {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn block_slots_keep_indentation() {
        let t = Template::parse("t", "for i in x:\n    {{body}}\nend").unwrap();
        let out = t.render(&kw(&[("body", "a = 1\nb = 2")])).unwrap();
        assert_eq!(out.main().unwrap(), "for i in x:\n    a = 1\n    b = 2\nend\n");
    }

    #[test]
    fn empty_optional_slot_removes_line() {
        let t = Template::parse("t", "start\n  {{support?}}\n  {{defines?}}\nend").unwrap();
        let out = t.render(&kw(&[("defines", "")])).unwrap();
        assert_eq!(out.main().unwrap(), "start\nend\n");
    }

    #[test]
    fn missing_required_slot() {
        let t = Template::parse("t", "void {{name}}()").unwrap();
        let err = t.render(&Keywords::new()).unwrap_err();
        assert!(matches!(err, TemplateError::MissingSlot { ref slot, .. } if slot == "name"));
    }

    #[test]
    fn inline_slots() {
        let t = Template::parse("t", "void _run_{{name}}(double {{arg?}}) {}").unwrap();
        let out = t.render(&kw(&[("name", "neurons")])).unwrap();
        assert_eq!(out.main().unwrap(), "void _run_neurons(double ) {}\n");
    }

    #[test]
    fn sections_and_duplicates() {
        let t = Template::parse("t", "@@ section cpp\nA {{x}}\n@@ section h\nB").unwrap();
        assert_eq!(t.section_names().collect::<Vec<_>>(), vec!["cpp", "h"]);
        let out = t.render(&kw(&[("x", "1")])).unwrap();
        assert_eq!(out.section("cpp"), Some("A 1\n"));
        assert_eq!(out.section("h"), Some("B\n"));

        let err = Template::parse("t", "@@ section a\n@@ section a\n").unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateSection { .. }));
    }

    #[test]
    fn malformed_slots_fail_at_load() {
        for text in ["x {{ y", "{{}}", "{{a b}}", "{{a-b?}}"] {
            let err = Template::parse("t", text).unwrap_err();
            assert!(matches!(err, TemplateError::MalformedSlot { line: 1, .. }), "{text}");
        }
    }

    #[test]
    fn metadata_directives() {
        let t = Template::parse("reset", "@@ kernel reset _spikes\n@@ iterate_all false\n{{vector_code}}").unwrap();
        assert!(!t.meta().iterate_all);
        assert_eq!(t.meta().kernel, RuntimeKernel::Reset { subset: "_spikes".into() });
        assert!(Template::parse("t", "@@ kernel sideways").is_err());
        assert!(Template::parse("t", "@@ iterate_all maybe").is_err());
    }

    #[test]
    fn templater_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stateupdate.tmpl"), "{{vector_code}}\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let templater = Templater::from_dir(dir.path()).unwrap();
        assert_eq!(templater.names().collect::<Vec<_>>(), vec!["stateupdate"]);
        assert!(templater.get("stateupdate").is_some());
    }

    #[test]
    fn templater_from_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = Templater::from_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
