// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! NGINX configuration directive tree: tokenizer, parser, include
//! expansion, and the generic tree walkers the resolvers build on.
//!
//! This is deliberately not a general configuration-language parser; it
//! understands exactly the NGINX surface syntax (`;`-terminated directives,
//! `{}` blocks, `#` comments, single/double quoting).

use std::fs;
use std::path::{Path, PathBuf};

use glob_match::glob_match;
use log::warn;
use thiserror::Error;

/// Cycle guard for include expansion.
const MAX_INCLUDE_DEPTH: usize = 16;

/// One configuration statement: a name, its ordered arguments, and the
/// nested block (empty for `;`-terminated directives).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Directive {
    pub name: String,
    pub args: Vec<String>,
    pub children: Vec<Directive>,
}

impl Directive {
    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|child| child.name == name)
    }
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("config path {path} is outside the allowed directories")]
    DisallowedPath { path: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unexpected '}}' in {file}")]
    UnbalancedClose { file: String },
    #[error("missing '}}' in {file}")]
    UnterminatedBlock { file: String },
    #[error("unterminated quoted string in {file}")]
    UnterminatedString { file: String },
}

/// A fully parsed configuration: the directive tree with includes expanded
/// in place, and the inventory of files actually read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedConfig {
    pub directives: Vec<Directive>,
    pub files: Vec<String>,
}

/// Parses the root configuration file and expands `include` directives.
/// The root file must lie inside one of the allowed directories; included
/// files outside them are skipped with a warning rather than failing the
/// parse.
pub fn parse_file(path: &Path, allowed_dirs: &[PathBuf]) -> Result<ParsedConfig, ParseError> {
    if !is_allowed(path, allowed_dirs) {
        return Err(ParseError::DisallowedPath {
            path: path.display().to_string(),
        });
    }

    let base_dir = path.parent().unwrap_or(Path::new("/")).to_path_buf();
    let mut parsed = ParsedConfig::default();
    let directives = load_one(path, &mut parsed.files)?;
    parsed.directives = expand_includes(directives, &base_dir, allowed_dirs, &mut parsed.files, 0)?;
    Ok(parsed)
}

fn load_one(path: &Path, files: &mut Vec<String>) -> Result<Vec<Directive>, ParseError> {
    let text = fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.display().to_string(),
        source,
    })?;
    files.push(path.display().to_string());
    parse_str(&text, &path.display().to_string())
}

fn is_allowed(path: &Path, allowed_dirs: &[PathBuf]) -> bool {
    allowed_dirs.iter().any(|dir| path.starts_with(dir))
}

/// Replaces every `include` directive with the directives of the files it
/// names. Relative paths and glob patterns resolve against the root config's
/// directory, the way `nginx -p` does by default.
fn expand_includes(
    directives: Vec<Directive>,
    base_dir: &Path,
    allowed_dirs: &[PathBuf],
    files: &mut Vec<String>,
    depth: usize,
) -> Result<Vec<Directive>, ParseError> {
    if depth >= MAX_INCLUDE_DEPTH {
        warn!("include nesting deeper than {MAX_INCLUDE_DEPTH}, stopping expansion");
        return Ok(directives);
    }

    let mut expanded = Vec::with_capacity(directives.len());
    for mut directive in directives {
        if directive.name == "include" {
            for pattern in &directive.args {
                for target in resolve_include(pattern, base_dir) {
                    if !is_allowed(&target, allowed_dirs) {
                        warn!(
                            "skipping include {} outside the allowed directories",
                            target.display()
                        );
                        continue;
                    }
                    let nested = load_one(&target, files)?;
                    expanded.extend(expand_includes(
                        nested,
                        base_dir,
                        allowed_dirs,
                        files,
                        depth + 1,
                    )?);
                }
            }
            continue;
        }

        directive.children =
            expand_includes(directive.children, base_dir, allowed_dirs, files, depth + 1)?;
        expanded.push(directive);
    }
    Ok(expanded)
}

/// An include argument is either a literal path or a glob; globs are
/// matched against the entries of the pattern's parent directory.
fn resolve_include(pattern: &str, base_dir: &Path) -> Vec<PathBuf> {
    let absolute = if Path::new(pattern).is_absolute() {
        PathBuf::from(pattern)
    } else {
        base_dir.join(pattern)
    };

    let pattern_str = absolute.display().to_string();
    if !pattern_str.contains(['*', '?', '[']) {
        return vec![absolute];
    }

    let Some(parent) = absolute.parent() else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(parent) else {
        warn!("include pattern {pattern_str} matches no readable directory");
        return Vec::new();
    };
    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| glob_match(&pattern_str, &path.display().to_string()))
        .collect();
    matches.sort();
    matches
}

enum Token {
    Word(String),
    OpenBrace,
    CloseBrace,
    Semicolon,
}

fn tokenize(input: &str, file: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut word = String::new();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                flush_word(&mut word, &mut tokens);
                for comment_char in chars.by_ref() {
                    if comment_char == '\n' {
                        break;
                    }
                }
            }
            '\'' | '"' => {
                let mut closed = false;
                while let Some(quoted) = chars.next() {
                    if quoted == '\\' {
                        if let Some(escaped) = chars.next() {
                            word.push(escaped);
                        }
                        continue;
                    }
                    if quoted == c {
                        closed = true;
                        break;
                    }
                    word.push(quoted);
                }
                if !closed {
                    return Err(ParseError::UnterminatedString {
                        file: file.to_string(),
                    });
                }
                // A quoted token may be empty ("" is a legal argument).
                tokens.push(Token::Word(std::mem::take(&mut word)));
            }
            '{' => {
                flush_word(&mut word, &mut tokens);
                tokens.push(Token::OpenBrace);
            }
            '}' => {
                flush_word(&mut word, &mut tokens);
                tokens.push(Token::CloseBrace);
            }
            ';' => {
                flush_word(&mut word, &mut tokens);
                tokens.push(Token::Semicolon);
            }
            c if c.is_whitespace() => flush_word(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush_word(&mut word, &mut tokens);
    Ok(tokens)
}

fn flush_word(word: &mut String, tokens: &mut Vec<Token>) {
    if !word.is_empty() {
        tokens.push(Token::Word(std::mem::take(word)));
    }
}

fn directive_from(mut parts: Vec<String>) -> Directive {
    let name = if parts.is_empty() {
        String::new()
    } else {
        parts.remove(0)
    };
    Directive {
        name,
        args: parts,
        children: Vec::new(),
    }
}

/// Parses one file's text into a directive forest.
pub fn parse_str(input: &str, file: &str) -> Result<Vec<Directive>, ParseError> {
    let tokens = tokenize(input, file)?;

    // `stack[0]` is a sentinel holding the top-level directives.
    let mut stack: Vec<Directive> = vec![Directive::default()];
    let mut pending: Vec<String> = Vec::new();

    for token in tokens {
        match token {
            Token::Word(word) => pending.push(word),
            Token::Semicolon => {
                if !pending.is_empty()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(directive_from(std::mem::take(&mut pending)));
                }
            }
            Token::OpenBrace => {
                stack.push(directive_from(std::mem::take(&mut pending)));
            }
            Token::CloseBrace => {
                if stack.len() < 2 {
                    return Err(ParseError::UnbalancedClose {
                        file: file.to_string(),
                    });
                }
                // Tokens dangling before a '}' (missing ';') are dropped.
                pending.clear();
                if let Some(block) = stack.pop()
                    && let Some(parent) = stack.last_mut()
                {
                    parent.children.push(block);
                }
            }
        }
    }

    if stack.len() != 1 {
        return Err(ParseError::UnterminatedBlock {
            file: file.to_string(),
        });
    }
    if !pending.is_empty()
        && let Some(root) = stack.last_mut()
    {
        // Trailing directive without ';': keep it rather than lose it.
        root.children.push(directive_from(pending));
    }

    stack.pop().map(|root| root.children).ok_or_else(|| {
        ParseError::UnterminatedBlock {
            file: file.to_string(),
        }
    })
}

/// Depth-first traversal in document order; the callback sees the parent
/// directive (or None at top level) and the current one, before recursion
/// into the current node's children.
pub fn crawl<F>(directives: &[Directive], visit: &mut F)
where
    F: FnMut(Option<&Directive>, &Directive),
{
    crawl_inner(None, directives, visit);
}

fn crawl_inner<F>(parent: Option<&Directive>, directives: &[Directive], visit: &mut F)
where
    F: FnMut(Option<&Directive>, &Directive),
{
    for directive in directives {
        visit(parent, directive);
        crawl_inner(Some(directive), &directive.children, visit);
    }
}

/// Like [`crawl`] but stops at the first visit returning `Some`, yielding
/// that value. Used where the first match in document order wins.
pub fn crawl_until<F>(directives: &[Directive], visit: &mut F) -> Option<String>
where
    F: FnMut(Option<&Directive>, &Directive) -> Option<String>,
{
    crawl_until_inner(None, directives, visit)
}

fn crawl_until_inner<F>(
    parent: Option<&Directive>,
    directives: &[Directive],
    visit: &mut F,
) -> Option<String>
where
    F: FnMut(Option<&Directive>, &Directive) -> Option<String>,
{
    for directive in directives {
        if let Some(found) = visit(parent, directive) {
            return Some(found);
        }
        if let Some(found) = crawl_until_inner(Some(directive), &directive.children, visit) {
            return Some(found);
        }
    }
    None
}
