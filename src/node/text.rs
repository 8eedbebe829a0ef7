//! Text processor: string transformations over resolved inputs.
//!
//! Modes: `append` (concatenate a suffix), `replace` (literal or regex),
//! `wordFreq` (token statistics). Results are published as output slots
//! for downstream references; where the results end up on disk or the
//! wire is a concern of the surrounding workflow, not of this node.

use async_trait::async_trait;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use super::{Node, NodeContext, optional_input, required_input, single_successor};
use crate::document::ValueSource;
use crate::error::NodeError;
use crate::graph::PreparedNode;
use crate::utils::values::truthy;

#[derive(Debug)]
pub struct TextNode {
    id: String,
    mode: String,
    content: ValueSource,
    suffix: Option<ValueSource>,
    search_text: Option<ValueSource>,
    replace_text: Option<ValueSource>,
    use_regex: Option<ValueSource>,
    ignore_case: Option<ValueSource>,
    min_length: Option<ValueSource>,
    transitions: Vec<(String, String)>,
    next: Option<String>,
}

impl TextNode {
    pub fn new(record: &PreparedNode) -> Result<Self, NodeError> {
        let mode = record
            .data
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            id: record.id.clone(),
            mode,
            content: required_input(record, "content")?,
            suffix: optional_input(record, "suffix")?,
            search_text: optional_input(record, "searchText")?,
            replace_text: optional_input(record, "replaceText")?,
            use_regex: optional_input(record, "useRegex")?,
            ignore_case: optional_input(record, "ignoreCase")?,
            min_length: optional_input(record, "minLength")?,
            transitions: record.transitions.clone(),
            next: None,
        })
    }

    fn string_input(
        &self,
        ctx: &NodeContext<'_>,
        source: Option<&ValueSource>,
        what: &str,
    ) -> Result<String, NodeError> {
        let source = source.ok_or_else(|| {
            NodeError::Validation(format!("node {}: missing input `{what}`", self.id))
        })?;
        let value = ctx.resolve(source)?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            NodeError::Validation(format!("node {}: input `{what}` must be a string", self.id))
        })
    }

    fn append(&self, ctx: &NodeContext<'_>, content: &str) -> Result<Value, NodeError> {
        let suffix = self.string_input(ctx, self.suffix.as_ref(), "suffix")?;
        Ok(json!({ "result": format!("{content}{suffix}") }))
    }

    fn replace(&self, ctx: &NodeContext<'_>, content: &str) -> Result<Value, NodeError> {
        let search = self.string_input(ctx, self.search_text.as_ref(), "searchText")?;
        let replacement = self.string_input(ctx, self.replace_text.as_ref(), "replaceText")?;
        let use_regex = ctx
            .resolve_optional(self.use_regex.as_ref())
            .is_some_and(|v| truthy(&v));

        let (result, count) = if use_regex {
            let pattern = Regex::new(&search).map_err(|err| NodeError::Execution {
                detail: format!("invalid search pattern: {err}"),
            })?;
            let count = pattern.find_iter(content).count();
            (
                pattern.replace_all(content, replacement.as_str()).into_owned(),
                count,
            )
        } else {
            let count = content.matches(&search).count();
            (content.replace(&search, &replacement), count)
        };

        Ok(json!({ "result": result, "replacementCount": count }))
    }

    fn word_freq(&self, ctx: &NodeContext<'_>, content: &str) -> Result<Value, NodeError> {
        let ignore_case = ctx
            .resolve_optional(self.ignore_case.as_ref())
            .is_some_and(|v| truthy(&v));
        let min_length = ctx
            .resolve_optional(self.min_length.as_ref())
            .and_then(|v| v.as_u64())
            .unwrap_or(1) as usize;

        let normalized = if ignore_case {
            content.to_lowercase()
        } else {
            content.to_string()
        };

        let tokens = Regex::new(r"\b\w+\b").map_err(|err| NodeError::Execution {
            detail: format!("tokenizer pattern failed: {err}"),
        })?;
        let words: Vec<&str> = tokens
            .find_iter(&normalized)
            .map(|m| m.as_str())
            .filter(|word| word.chars().count() >= min_length)
            .collect();

        let mut frequencies: FxHashMap<&str, u64> = FxHashMap::default();
        for word in &words {
            *frequencies.entry(word).or_default() += 1;
        }

        Ok(json!({
            "statistics": {
                "totalWords": words.len(),
                "uniqueWords": frequencies.len(),
                "frequencies": frequencies,
            }
        }))
    }
}

#[async_trait]
impl Node for TextNode {
    async fn run(&mut self, ctx: &mut NodeContext<'_>) -> Result<Value, NodeError> {
        let content = {
            let value = ctx.resolve(&self.content)?;
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    NodeError::Validation(format!(
                        "node {}: input `content` must be a string",
                        self.id
                    ))
                })?
        };

        let result = match self.mode.as_str() {
            "append" => self.append(ctx, &content)?,
            "replace" => self.replace(ctx, &content)?,
            "wordFreq" => self.word_freq(ctx, &content)?,
            other => {
                return Err(NodeError::Validation(format!(
                    "node {}: unsupported text mode: {other}",
                    self.id
                )));
            }
        };

        if let Some(outputs) = result.as_object() {
            for (slot, value) in outputs {
                ctx.publish(slot, value.clone());
            }
        }
        ctx.info(format!("Text {} complete", self.mode));

        self.next = Some(single_successor(&self.transitions, &self.id)?);
        Ok(result)
    }

    fn next(&self) -> Option<&str> {
        self.next.as_deref()
    }
}
