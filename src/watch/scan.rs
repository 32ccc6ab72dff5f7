//! scanf-style patterns used to pull a value out of a field.
//!
//! A pattern is literal text around one placeholder, e.g. `"%f MHz"`.
//! Whitespace in the pattern matches any run of input whitespace, including
//! none. Other literal text must match exactly. The placeholder skips
//! leading input whitespace before reading its token. Anything after the
//! placeholder is informational only: once the placeholder has been filled
//! the value is kept even if the rest of the input differs.

use std::fmt;

/// Placeholder kinds a pattern may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `%f %F %e %E %g %G`
    Float,
    /// `%s`
    String,
    /// `%v`, which reads whatever the target accepts
    Value,
    /// Any other verb; valid for neither target
    Other(char),
}

impl Verb {
    fn from_char(c: char) -> Self {
        match c {
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => Verb::Float,
            's' => Verb::String,
            'v' => Verb::Value,
            other => Verb::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Space,
    Literal(char),
}

/// A compiled scan pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPattern {
    source: String,
    prefix: Vec<Piece>,
    verb: Option<Verb>,
}

impl ScanPattern {
    /// Compile `pattern`. Compilation never fails; a pattern without a
    /// placeholder simply never produces a value.
    pub fn new(pattern: &str) -> Self {
        let mut prefix = Vec::new();
        let mut verb = None;
        let mut chars = pattern.chars();

        while let Some(c) = chars.next() {
            match c {
                '%' => match chars.next() {
                    Some('%') => prefix.push(Piece::Literal('%')),
                    Some(v) => {
                        verb = Some(Verb::from_char(v));
                        break;
                    }
                    None => break,
                },
                c if c.is_whitespace() => {
                    if prefix.last() != Some(&Piece::Space) {
                        prefix.push(Piece::Space);
                    }
                }
                c => prefix.push(Piece::Literal(c)),
            }
        }

        Self {
            source: pattern.to_string(),
            prefix,
            verb,
        }
    }

    /// Pattern text as configured.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern carries a placeholder at all.
    pub fn has_placeholder(&self) -> bool {
        self.verb.is_some()
    }

    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    /// Scan a float out of `input`.
    pub fn scan_f64(&self, input: &str) -> Option<f64> {
        match self.verb? {
            Verb::Float | Verb::Value => {
                let rest = self.match_prefix(input)?;
                float_token(rest.trim_start())?.parse().ok()
            }
            _ => None,
        }
    }

    /// Scan a whitespace-free string token out of `input`.
    pub fn scan_string(&self, input: &str) -> Option<String> {
        match self.verb? {
            Verb::String | Verb::Value => {
                let rest = self.match_prefix(input)?.trim_start();
                let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                (end > 0).then(|| rest[..end].to_string())
            }
            _ => None,
        }
    }

    fn match_prefix<'a>(&self, input: &'a str) -> Option<&'a str> {
        let mut rest = input;
        for piece in &self.prefix {
            match piece {
                Piece::Space => rest = rest.trim_start(),
                Piece::Literal(c) => rest = rest.strip_prefix(*c)?,
            }
        }
        Some(rest)
    }
}

impl Default for ScanPattern {
    fn default() -> Self {
        Self::new("%f")
    }
}

impl fmt::Display for ScanPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Longest prefix of `input` that looks like a decimal float.
fn float_token(input: &str) -> Option<&str> {
    let bytes = input.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        let frac_start = end;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        digits += end - frac_start;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    Some(&input[..end])
}
