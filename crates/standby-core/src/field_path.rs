//! ヘルスレスポンスJSONからバージョントークンを取り出すフィールドパス
//!
//! jq 風の記法をサポートします:
//! - `.version`
//! - `.engine.version`
//! - `.items[0].version`
//! - `.["build info"].tag`
//!
//! 先頭の `.` は省略可能です（`version` と `.version` は同じ意味）。

use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// パース済みのフィールドパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "空のパスは指定できません"));
        }

        let chars: Vec<char> = raw.chars().collect();
        let mut segments = Vec::new();
        let mut pos = 0;

        // 先頭の "." は省略可能
        if chars[0] == '.' {
            pos = 1;
        }

        // "." のみは JSON 全体を指す
        if pos == chars.len() {
            return Ok(Self {
                raw: raw.to_string(),
                segments,
            });
        }

        let mut expect_segment = true;
        while pos < chars.len() {
            match chars[pos] {
                '[' => {
                    let (segment, next) = parse_bracket(raw, &chars, pos)?;
                    segments.push(segment);
                    pos = next;
                    expect_segment = false;
                }
                '.' if !expect_segment => {
                    pos += 1;
                    expect_segment = true;
                    if pos == chars.len() || chars[pos] == '.' {
                        return Err(invalid(raw, "'.' の後にキーがありません"));
                    }
                }
                '"' if expect_segment => {
                    let (key, next) = parse_quoted(raw, &chars, pos)?;
                    segments.push(Segment::Key(key));
                    pos = next;
                    expect_segment = false;
                }
                c if expect_segment && is_ident_char(c) => {
                    let start = pos;
                    while pos < chars.len() && is_ident_char(chars[pos]) {
                        pos += 1;
                    }
                    segments.push(Segment::Key(chars[start..pos].iter().collect()));
                    expect_segment = false;
                }
                c => {
                    return Err(invalid(raw, format!("予期しない文字 '{}' (位置 {})", c, pos)));
                }
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

    /// パスが指す値を返す（存在しない場合は None）
    pub fn extract<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current)
    }

    /// パスが指す値をトークン文字列として返す
    ///
    /// `null`・空文字列・存在しないフィールドはすべて None になる。
    /// 文字列はそのまま、数値と真偽値は JSON 表記、オブジェクトと配列はコンパクトな JSON。
    pub fn extract_token(&self, root: &Value) -> Option<String> {
        match self.extract(root)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl FromStr for FieldPath {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn parse_bracket(raw: &str, chars: &[char], start: usize) -> Result<(Segment, usize)> {
    let mut pos = start + 1;
    if pos < chars.len() && chars[pos] == '"' {
        let (key, next) = parse_quoted(raw, chars, pos)?;
        if next >= chars.len() || chars[next] != ']' {
            return Err(invalid(raw, "']' が閉じられていません"));
        }
        return Ok((Segment::Key(key), next + 1));
    }

    let digits_start = pos;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == digits_start || pos >= chars.len() || chars[pos] != ']' {
        return Err(invalid(raw, "配列インデックスは [0] の形式で指定してください"));
    }
    let digits: String = chars[digits_start..pos].iter().collect();
    let index = digits
        .parse::<usize>()
        .map_err(|e| invalid(raw, e.to_string()))?;
    Ok((Segment::Index(index), pos + 1))
}

fn parse_quoted(raw: &str, chars: &[char], start: usize) -> Result<(String, usize)> {
    let mut pos = start + 1;
    let mut key = String::new();
    while pos < chars.len() {
        match chars[pos] {
            '\\' if pos + 1 < chars.len() => {
                key.push(chars[pos + 1]);
                pos += 2;
            }
            '"' => return Ok((key, pos + 1)),
            c => {
                key.push(c);
                pos += 1;
            }
        }
    }
    Err(invalid(raw, "クォートが閉じられていません"))
}

fn invalid(path: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidFieldPath {
        path: path.to_string(),
        message: message.into(),
    }
}
