//! Cache key templating and formatting.
//!
//! A [`KeyTemplate`] compiles a string like `user:{user_id}:profile` or
//! `user:{token:jwt(sub)}` into two things:
//!
//! - a renderer that, given argument bindings, produces a concrete [`Key`];
//! - a [`regex::Regex`] with named capture groups that extracts those same
//!   bindings back out of a concrete key (used by the tag registry's reverse
//!   lookup, see the facade crate's `tags` module).
//!
//! Placeholders may carry a formatter suffix: `{name:fmt(arg1,arg2)}`. The
//! built-in formatters are `hash(alg)`, `jwt(claim)`, `len`, `upper`, and
//! `lower`; applications can register additional ones with
//! [`register_formatter`]. Rendered keys are always lowercased, matching the
//! case-insensitive key convention.
//!
//! ```
//! use cashier_core::key::KeyTemplate;
//! use std::collections::HashMap;
//!
//! let tpl = KeyTemplate::compile("user:{user_id}:profile").unwrap();
//! let mut bindings = HashMap::new();
//! bindings.insert("user_id", "42");
//! let key = tpl.render(&bindings).unwrap();
//! assert_eq!(key.as_str(), "user:42:profile");
//! assert!(tpl.pattern().is_match(key.as_str()));
//! ```

use dashmap::DashMap;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest as Sha2Digest, Sha256};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A rendered, concrete cache key.
///
/// Unicode string, case-insensitive by convention: [`KeyTemplate::render`]
/// always lowercases its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(SmolStr);

impl Key {
    /// Wraps an already-rendered string as a key without going through a template.
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Key(s.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(SmolStr::new(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(SmolStr::from(s))
    }
}

/// Errors raised while compiling a key template.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{` was never closed with a matching `}`.
    #[error("unterminated placeholder in template {0:?}")]
    UnterminatedPlaceholder(String),
    /// A placeholder's formatter spec (`fmt(args)`) was malformed.
    #[error("malformed formatter spec {0:?}")]
    MalformedFormatter(String),
    /// A referenced formatter name has no built-in or registered implementation.
    #[error("unknown formatter {0:?}")]
    UnknownFormatter(String),
    /// A placeholder named in the template had no binding supplied at render time.
    #[error("missing binding for placeholder {0:?}")]
    MissingBinding(String),
}

/// A formatter applied to a placeholder's bound value.
pub trait ValueFormatter: Send + Sync {
    /// Transform the raw bound value given the formatter's parenthesized arguments.
    fn format(&self, value: &str, args: &[SmolStr]) -> SmolStr;
}

struct HashFormatter;
impl ValueFormatter for HashFormatter {
    fn format(&self, value: &str, args: &[SmolStr]) -> SmolStr {
        let alg = args.first().map(|s| s.as_str()).unwrap_or("sha256");
        match alg {
            "sha1" => {
                let mut hasher = Sha1::new();
                Sha2Digest::update(&mut hasher, value.as_bytes());
                SmolStr::new(format!("{:x}", hasher.finalize()))
            }
            "md5" => {
                use md5::Digest;
                let mut hasher = md5::Md5::new();
                hasher.update(value.as_bytes());
                SmolStr::new(format!("{:x}", hasher.finalize()))
            }
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(value.as_bytes());
                SmolStr::new(format!("{:x}", hasher.finalize()))
            }
        }
    }
}

struct LenFormatter;
impl ValueFormatter for LenFormatter {
    fn format(&self, value: &str, _args: &[SmolStr]) -> SmolStr {
        SmolStr::new(value.chars().count().to_string())
    }
}

struct UpperFormatter;
impl ValueFormatter for UpperFormatter {
    fn format(&self, value: &str, _args: &[SmolStr]) -> SmolStr {
        SmolStr::new(value.to_uppercase())
    }
}

struct LowerFormatter;
impl ValueFormatter for LowerFormatter {
    fn format(&self, value: &str, _args: &[SmolStr]) -> SmolStr {
        SmolStr::new(value.to_lowercase())
    }
}

struct JwtFormatter;
impl ValueFormatter for JwtFormatter {
    /// Extracts a claim from an unverified JWT without checking its signature:
    /// the token is already presumed authenticated by the time it reaches the
    /// key formatter, this only extracts a stable cache-key component.
    fn format(&self, value: &str, args: &[SmolStr]) -> SmolStr {
        let Some(claim) = args.first() else {
            return SmolStr::new(value);
        };
        let Some(payload_b64) = value.split('.').nth(1) else {
            return SmolStr::new(value);
        };
        let Ok(payload) = base64_url_decode(payload_b64) else {
            return SmolStr::new(value);
        };
        let Ok(json) = serde_json::from_slice::<serde_json::Value>(&payload) else {
            return SmolStr::new(value);
        };
        json.get(claim.as_str())
            .and_then(|v| v.as_str().map(SmolStr::new).or_else(|| Some(SmolStr::new(v.to_string()))))
            .unwrap_or_else(|| SmolStr::new(value))
    }
}

/// Minimal base64url decoder (no padding), just enough to pull a JWT payload apart.
fn base64_url_decode(input: &str) -> Result<Vec<u8>, ()> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
    let mut table = [255u8; 256];
    for (i, &c) in ALPHABET.iter().enumerate() {
        table[c as usize] = i as u8;
    }
    let mut bits: u32 = 0;
    let mut nbits = 0;
    let mut out = Vec::new();
    for ch in input.bytes() {
        let v = table[ch as usize];
        if v == 255 {
            continue;
        }
        bits = (bits << 6) | v as u32;
        nbits += 6;
        if nbits >= 8 {
            nbits -= 8;
            out.push((bits >> nbits) as u8);
        }
    }
    Ok(out)
}

fn registry() -> &'static DashMap<SmolStr, Arc<dyn ValueFormatter>> {
    static REGISTRY: OnceLock<DashMap<SmolStr, Arc<dyn ValueFormatter>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let map = DashMap::new();
        map.insert(SmolStr::new_static("hash"), Arc::new(HashFormatter) as Arc<dyn ValueFormatter>);
        map.insert(SmolStr::new_static("jwt"), Arc::new(JwtFormatter) as Arc<dyn ValueFormatter>);
        map.insert(SmolStr::new_static("len"), Arc::new(LenFormatter) as Arc<dyn ValueFormatter>);
        map.insert(SmolStr::new_static("upper"), Arc::new(UpperFormatter) as Arc<dyn ValueFormatter>);
        map.insert(SmolStr::new_static("lower"), Arc::new(LowerFormatter) as Arc<dyn ValueFormatter>);
        map
    })
}

/// Registers a custom named formatter, usable as `{name:my_formatter(args)}`.
///
/// Registration is append-only and idempotent: re-registering the same name
/// simply replaces the implementation, matching the process-wide registry's
/// "safe to call from multiple places" contract.
pub fn register_formatter(name: impl Into<SmolStr>, formatter: impl ValueFormatter + 'static) {
    registry().insert(name.into(), Arc::new(formatter));
}

#[derive(Debug, Clone)]
struct FormatterSpec {
    name: SmolStr,
    args: Vec<SmolStr>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(SmolStr),
    Placeholder {
        name: SmolStr,
        formatter: Option<FormatterSpec>,
    },
}

/// A compiled key template: renders concrete keys and matches them back.
pub struct KeyTemplate {
    raw: SmolStr,
    segments: Vec<Segment>,
    pattern: Regex,
}

impl fmt::Debug for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyTemplate").field("raw", &self.raw).finish()
    }
}

impl KeyTemplate {
    /// Compiles a template string into its segments and matching regex.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut pattern = String::from("^");
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((_, ch)) = chars.next() {
            if ch != '{' {
                literal.push(ch);
                pattern.push_str(&regex::escape(&ch.to_string()));
                continue;
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(SmolStr::new(&literal)));
                literal.clear();
            }
            let mut inner = String::new();
            let mut closed = false;
            for (_, c) in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                inner.push(c);
            }
            if !closed {
                return Err(TemplateError::UnterminatedPlaceholder(template.to_string()));
            }
            let (name, formatter) = parse_placeholder(&inner)?;
            pattern.push_str(&format!("(?P<{}>.+)?", name));
            segments.push(Segment::Placeholder {
                name: SmolStr::new(&name),
                formatter,
            });
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(SmolStr::new(&literal)));
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|_| TemplateError::MalformedFormatter(template.to_string()))?;

        Ok(KeyTemplate {
            raw: SmolStr::new(template),
            segments,
            pattern,
        })
    }

    /// The original template string.
    pub fn template(&self) -> &str {
        &self.raw
    }

    /// The regex used to extract bindings back out of a rendered key.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Renders a concrete, lowercased [`Key`] from argument bindings.
    pub fn render(&self, bindings: &HashMap<&str, &str>) -> Result<Key, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => out.push_str(lit),
                Segment::Placeholder { name, formatter } => {
                    let value = bindings
                        .get(name.as_str())
                        .ok_or_else(|| TemplateError::MissingBinding(name.to_string()))?;
                    match formatter {
                        Some(spec) => {
                            let f = registry()
                                .get(&spec.name)
                                .ok_or_else(|| TemplateError::UnknownFormatter(spec.name.to_string()))?;
                            out.push_str(f.format(value, &spec.args).as_str());
                        }
                        None => out.push_str(value),
                    }
                }
            }
        }
        Ok(Key::new(out.to_lowercase()))
    }
}

fn parse_placeholder(inner: &str) -> Result<(String, Option<FormatterSpec>), TemplateError> {
    match inner.split_once(':') {
        None => Ok((inner.to_string(), None)),
        Some((name, fmt_spec)) => {
            let (fname, args) = match fmt_spec.split_once('(') {
                None => (fmt_spec.to_string(), Vec::new()),
                Some((fname, rest)) => {
                    let args_str = rest
                        .strip_suffix(')')
                        .ok_or_else(|| TemplateError::MalformedFormatter(fmt_spec.to_string()))?;
                    let args = if args_str.is_empty() {
                        Vec::new()
                    } else {
                        args_str.split(',').map(|a| SmolStr::new(a.trim())).collect()
                    };
                    (fname.to_string(), args)
                }
            };
            Ok((
                name.to_string(),
                Some(FormatterSpec {
                    name: SmolStr::new(&fname),
                    args,
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_plain_placeholders() {
        let tpl = KeyTemplate::compile("user:{user_id}:profile").unwrap();
        let mut b = HashMap::new();
        b.insert("user_id", "42");
        assert_eq!(tpl.render(&b).unwrap().as_str(), "user:42:profile");
    }

    #[test]
    fn lowercases_rendered_keys() {
        let tpl = KeyTemplate::compile("User:{id}").unwrap();
        let mut b = HashMap::new();
        b.insert("id", "ABC");
        assert_eq!(tpl.render(&b).unwrap().as_str(), "user:abc");
    }

    #[test]
    fn applies_len_formatter() {
        let tpl = KeyTemplate::compile("k:{value:len}").unwrap();
        let mut b = HashMap::new();
        b.insert("value", "hello");
        assert_eq!(tpl.render(&b).unwrap().as_str(), "k:5");
    }

    #[test]
    fn applies_hash_formatter_with_algorithm_arg() {
        let tpl = KeyTemplate::compile("k:{value:hash(sha256)}").unwrap();
        let mut b = HashMap::new();
        b.insert("value", "hello");
        let rendered = tpl.render(&b).unwrap();
        assert_eq!(rendered.as_str().len(), "k:".len() + 64);
    }

    #[test]
    fn pattern_matches_rendered_key_and_extracts_binding() {
        let tpl = KeyTemplate::compile("user:{user_id}:profile").unwrap();
        let mut b = HashMap::new();
        b.insert("user_id", "42");
        let key = tpl.render(&b).unwrap();
        let caps = tpl.pattern().captures(key.as_str()).unwrap();
        assert_eq!(&caps["user_id"], "42");
    }

    #[test]
    fn rejects_unterminated_placeholder() {
        assert!(matches!(
            KeyTemplate::compile("user:{user_id"),
            Err(TemplateError::UnterminatedPlaceholder(_))
        ));
    }

    #[test]
    fn custom_formatter_round_trips() {
        struct Reverse;
        impl ValueFormatter for Reverse {
            fn format(&self, value: &str, _args: &[SmolStr]) -> SmolStr {
                SmolStr::new(value.chars().rev().collect::<String>())
            }
        }
        register_formatter("reverse", Reverse);
        let tpl = KeyTemplate::compile("k:{value:reverse}").unwrap();
        let mut b = HashMap::new();
        b.insert("value", "abc");
        assert_eq!(tpl.render(&b).unwrap().as_str(), "k:cba");
    }
}
