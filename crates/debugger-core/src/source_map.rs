//! Source-to-address correlation for assembled Micro4 programs.
//!
//! The builder walks the editor buffer line by line with a running address
//! counter, mirroring the assembler's own address assignment:
//! - blank lines, comments, and label-only lines consume nothing
//! - `ORG n` moves the counter to `n`
//! - `DB`/`DW` consume 2/4 units per comma-separated value but are not
//!   steppable, so they get no entry
//! - everything else is one 2-unit instruction
//!
//! Malformed `ORG`/`DB`/`DW` lines are counted as instructions.

use std::collections::BTreeMap;

use crate::cpu_state::{Address, LineNumber};

/// Address units consumed by one instruction.
pub const INSTRUCTION_WIDTH: u32 = 2;
/// Address units consumed by each `DB` value.
pub const DB_VALUE_WIDTH: u32 = 2;
/// Address units consumed by each `DW` value.
pub const DW_VALUE_WIDTH: u32 = 4;

/// Bidirectional address/line table for one successfully assembled source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SourceMap {
    address_to_line: BTreeMap<Address, LineNumber>,
    line_to_address: BTreeMap<LineNumber, Address>,
}

/// Classification of one source line for address accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    Skip,
    Org(u32),
    Data { values: u32, width: u32 },
    Instruction,
}

impl SourceMap {
    /// Builds the map for `source`. Identical input yields an identical map.
    #[must_use]
    pub fn build(source: &str) -> Self {
        let mut map = Self::default();
        let mut counter: u32 = 0;

        for (idx, raw) in source.lines().enumerate() {
            match classify(raw) {
                Statement::Skip => {}
                Statement::Org(origin) => counter = origin,
                Statement::Data { values, width } => {
                    counter = counter.saturating_add(values.saturating_mul(width));
                }
                Statement::Instruction => {
                    if let Ok(address) = Address::try_from(counter) {
                        map.insert(address, idx + 1);
                    }
                    counter = counter.saturating_add(INSTRUCTION_WIDTH);
                }
            }
        }

        map
    }

    /// Records an executable line. A later line at an address already in the
    /// table replaces the earlier one in both directions.
    fn insert(&mut self, address: Address, line: LineNumber) {
        if let Some(previous) = self.address_to_line.insert(address, line) {
            self.line_to_address.remove(&previous);
        }
        self.line_to_address.insert(line, address);
    }

    /// Returns the source line of the instruction at `address`.
    #[must_use]
    pub fn line_for_address(&self, address: Address) -> Option<LineNumber> {
        self.address_to_line.get(&address).copied()
    }

    /// Returns the address of the instruction on `line`.
    #[must_use]
    pub fn address_for_line(&self, line: LineNumber) -> Option<Address> {
        self.line_to_address.get(&line).copied()
    }

    /// Number of executable lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.address_to_line.len()
    }

    /// Returns `true` when the source has no executable lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.address_to_line.is_empty()
    }

    /// Iterates `(address, line)` pairs in ascending address order.
    pub fn entries(&self) -> impl Iterator<Item = (Address, LineNumber)> + '_ {
        self.address_to_line.iter().map(|(&a, &l)| (a, l))
    }
}

fn classify(raw: &str) -> Statement {
    let code = strip_comment(raw).trim();
    if code.is_empty() {
        return Statement::Skip;
    }

    let code = match split_label(code) {
        Some("") => return Statement::Skip,
        Some(rest) => rest,
        None => code,
    };

    let (keyword, operands) = code
        .split_once(char::is_whitespace)
        .map_or((code, ""), |(k, rest)| (k, rest.trim()));

    let directive = if keyword.eq_ignore_ascii_case("ORG") {
        parse_number(operands).map(Statement::Org)
    } else if keyword.eq_ignore_ascii_case("DB") {
        count_values(operands).map(|values| Statement::Data {
            values,
            width: DB_VALUE_WIDTH,
        })
    } else if keyword.eq_ignore_ascii_case("DW") {
        count_values(operands).map(|values| Statement::Data {
            values,
            width: DW_VALUE_WIDTH,
        })
    } else {
        None
    };

    directive.unwrap_or(Statement::Instruction)
}

fn strip_comment(raw: &str) -> &str {
    raw.find(';').map_or(raw, |idx| &raw[..idx])
}

/// Splits a leading `NAME:` label, returning the trimmed remainder.
fn split_label(code: &str) -> Option<&str> {
    let (name, rest) = code.split_once(':')?;
    is_identifier(name.trim_end()).then_some(rest.trim())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parses an `ORG` operand.
///
/// `0x` and `$` prefixes select hex; unprefixed digits are hex when they
/// contain `a`-`f`, otherwise decimal.
pub(crate) fn parse_number(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
    {
        return u32::from_str_radix(hex, 16).ok();
    }

    if text.chars().any(|c| matches!(c, 'a'..='f' | 'A'..='F')) {
        u32::from_str_radix(text, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Counts comma-separated data values; `None` when any value is missing.
fn count_values(operands: &str) -> Option<u32> {
    if operands.is_empty() {
        return None;
    }
    let mut count: u32 = 0;
    for value in operands.split(',') {
        if value.trim().is_empty() {
            return None;
        }
        count = count.saturating_add(1);
    }
    Some(count)
}
