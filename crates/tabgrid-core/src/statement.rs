//! Vocabulary of financial statements: dates, amounts, column headings and
//! the account-information block printed above the transaction list.

use crate::geometry::{CleanPage, PageInput};
use crate::model::{ExtractionResult, StrategyKind};
use crate::strategies::cluster::{group_lines, median_height};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::LazyLock;

static DATE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}[/\-.]\d{1,2}[/\-.](?:\d{4}|\d{2})$").unwrap());
static DATE_MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}[\-/. ]?[A-Za-z]{3,9}[\-/. ,]{0,2}(?:\d{4}|\d{2})$").unwrap()
});
static DATE_ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[-+]?\(?[-+]?[$€£₹¥]?\s?[-+]?(?:\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d{1,3}(?:\.\d{3})+,\d{2}|\d+(?:[.,]\d{2})?)\)?(?:\s?(?:[Dd][Rr]|[Cc][Rr]))?$",
    )
    .unwrap()
});

static FURNITURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)page\s+\d+|bank\s+name|branch\s+name|ifsc\s+code|micr\s+code").unwrap()
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const STATEMENT_KEYWORDS: [&str; 16] = [
    "account",
    "statement",
    "balance",
    "transaction",
    "credit",
    "debit",
    "bank",
    "deposit",
    "withdrawal",
    "opening balance",
    "closing balance",
    "date",
    "description",
    "amount",
    "reference",
    "branch",
];

const HEADING_WORDS: [&str; 13] = [
    "date",
    "description",
    "amount",
    "balance",
    "debit",
    "credit",
    "particulars",
    "withdrawal",
    "deposit",
    "transaction",
    "reference",
    "narration",
    "details",
];

/// True if `text` is a date in one of the supported formats.
///
/// Supported: `01/02/2024`, `1-2-24`, `01.02.2024`, `01-Jan-2024`,
/// `01 Jan 2024`, `2024-01-02`.
pub fn is_date(text: &str) -> bool {
    let t = text.trim().trim_end_matches([',', ';']);
    if DATE_NUMERIC.is_match(t) || DATE_ISO.is_match(t) {
        return true;
    }
    if DATE_MONTH_NAME.is_match(t) {
        let lower = t.to_lowercase();
        return MONTHS.iter().any(|m| lower.contains(m));
    }
    false
}

/// True if `text` looks like a monetary amount.
///
/// Bare integers are rejected: they need a currency symbol, a thousands
/// separator, a two-digit fraction or a Dr/Cr marker to count, so that
/// reference numbers inside descriptions are not taken for amounts.
pub fn is_amount(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() || !AMOUNT.is_match(t) {
        return false;
    }
    let has_symbol = t.contains(['$', '€', '£', '₹', '¥']);
    let lower = t.to_lowercase();
    let has_marker = lower.ends_with("dr") || lower.ends_with("cr");
    let digits_only = t.trim_start_matches(['-', '+', '(']);
    let has_separator = digits_only.contains(',') || digits_only.contains('.');
    has_symbol || has_marker || has_separator
}

/// Parse an amount into a signed decimal.
///
/// Parentheses, a leading minus and a `Dr` suffix all mark a debit and make
/// the value negative. Both `1,234.56` and `1.234,56` are understood.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    if !is_amount(text) {
        return None;
    }
    let mut t = text.trim().to_string();
    let mut negative = false;

    let lower = t.to_lowercase();
    if lower.ends_with("dr") {
        negative = true;
        t.truncate(t.len() - 2);
    } else if lower.ends_with("cr") {
        t.truncate(t.len() - 2);
    }

    let mut digits = String::with_capacity(t.len());
    for c in t.chars() {
        match c {
            '(' | '-' => negative = true,
            '0'..='9' | '.' | ',' => digits.push(c),
            _ => {}
        }
    }

    let normalized = match (digits.rfind('.'), digits.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => digits.replace('.', "").replace(',', "."),
        // "12,50" is a decimal comma, "1,250" a thousands separator.
        (None, Some(comma)) if digits.len() - comma == 3 && digits.matches(',').count() == 1 => {
            digits.replace(',', ".")
        }
        _ => digits.replace(',', ""),
    };

    let value = Decimal::from_str(&normalized).ok()?;
    Some(if negative { -value } else { value })
}

/// True if the page text reads like a bank statement (three or more
/// statement keywords present).
pub fn looks_like_statement(page_text: &str) -> bool {
    let lower = page_text.to_lowercase();
    STATEMENT_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count()
        >= 3
}

/// Number of column-heading words in a line of text.
pub fn heading_hits(line: &str) -> usize {
    let lower = line.to_lowercase();
    HEADING_WORDS.iter().filter(|w| lower.contains(*w)).count()
}

/// Page furniture that never belongs to the transaction list.
pub fn is_page_furniture(line: &str) -> bool {
    FURNITURE.is_match(line)
}

/// Account information printed above the transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_period: Option<String>,
}

impl StatementHeader {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Present fields as `(name, value)` pairs, in a fixed order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("bank_name", &self.bank_name),
            ("branch_name", &self.branch_name),
            ("account_no", &self.account_no),
            ("account_name", &self.account_name),
            ("address", &self.address),
            ("statement_period", &self.statement_period),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

static HEADER_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("bank_name", r"(?i)\bbank\s*name\s*:?\s*(.+)"),
        ("branch_name", r"(?i)\bbranch\s*name\s*:?\s*(.+)"),
        (
            "account_no",
            r"(?i)\b(?:account|a/c)\s*(?:number|no\.?|#)\s*:?\s*(.+)",
        ),
        ("account_name", r"(?i)\b(?:account|a/c)\s*(?:name|holder)\s*:?\s*(.+)"),
        ("address", r"(?i)\b(?:address|addr)\s*:?\s*(.+)"),
        (
            "statement_period",
            r"(?i)\b(?:statement\s+period|statement\s+for(?:\s+the\s+period)?|for\s+the\s+period)\s*:?\s*(.+)",
        ),
    ]
    .into_iter()
    .map(|(k, p)| (k, Regex::new(p).unwrap()))
    .collect()
});

/// Pull labelled account fields out of text lines. First match per field
/// wins.
pub fn extract_statement_header<S: AsRef<str>>(lines: &[S]) -> StatementHeader {
    let mut header = StatementHeader::default();

    for line in lines {
        let line = line.as_ref();
        for (field, re) in HEADER_PATTERNS.iter() {
            let slot = match *field {
                "bank_name" => &mut header.bank_name,
                "branch_name" => &mut header.branch_name,
                "account_no" => &mut header.account_no,
                "account_name" => &mut header.account_name,
                "address" => &mut header.address,
                _ => &mut header.statement_period,
            };
            if slot.is_some() {
                continue;
            }
            if let Some(value) = re.captures(line).and_then(|c| c.get(1)) {
                let value = value.as_str().trim();
                if !value.is_empty() {
                    *slot = Some(value.to_string());
                }
            }
        }
    }

    header
}

/// Account information of a statement page, read line by line from its
/// tokens.
pub fn extract_page_header(page: &PageInput) -> StatementHeader {
    let clean = CleanPage::from_input(page);
    let all: Vec<usize> = (0..clean.tokens.len()).collect();
    let threshold = median_height(&clean.tokens, &all).unwrap_or(0.0) * 0.5;
    let lines: Vec<String> = group_lines(&clean.tokens, &all, threshold)
        .iter()
        .map(|line| {
            line.iter()
                .map(|&i| clean.tokens[i].text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    extract_statement_header(&lines)
}

/// Account information of a statement page: one that produced a
/// bank-statement table or reads like a statement. Any other page yields an
/// empty header, whatever labels it carries.
pub fn statement_page_header(page: &PageInput, result: &ExtractionResult) -> StatementHeader {
    let has_statement_table = result
        .candidates
        .iter()
        .any(|c| c.strategy() == StrategyKind::BankStatement);
    let text = page
        .tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if !has_statement_table && !looks_like_statement(&text) {
        return StatementHeader::default();
    }
    extract_page_header(page)
}
