//! Report data and per-chat roster types.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifier of one conversation (a chat on the transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default roster stored for a chat, reused by every new report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub chat_id: ChatId,
    pub group: String,
    pub members: String,
}

impl ChatConfig {
    pub fn new(chat_id: ChatId, group: impl Into<String>, members: impl Into<String>) -> Self {
        Self {
            chat_id,
            group: group.into(),
            members: members.into(),
        }
    }
}

/// Fields of the lab report being assembled.
///
/// Text fields hold the user's answers verbatim. `members` keeps the
/// comma-separated roster exactly as it will be printed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub title: String,
    pub group: String,
    pub members: String,
    pub summary: String,
    pub introduction: String,
    pub objectives: String,
    pub framework: String,
    pub methodology_intro: String,
    pub materials: String,
    pub setup: String,
    pub procedure: String,
    pub analysis: String,
    pub conclusions: String,
    pub references: String,
    pub date: NaiveDate,
    pub variables: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub chart_path: Option<PathBuf>,
    pub photo_path: Option<PathBuf>,
}

impl Default for ReportData {
    fn default() -> Self {
        Self {
            title: String::new(),
            group: String::new(),
            members: String::new(),
            summary: String::new(),
            introduction: String::new(),
            objectives: String::new(),
            framework: String::new(),
            methodology_intro: String::new(),
            materials: String::new(),
            setup: String::new(),
            procedure: String::new(),
            analysis: String::new(),
            conclusions: String::new(),
            references: String::new(),
            date: Local::now().date_naive(),
            variables: Vec::new(),
            rows: Vec::new(),
            chart_path: None,
            photo_path: None,
        }
    }
}

impl ReportData {
    /// Start a report from a stored roster.
    pub fn from_roster(config: &ChatConfig) -> Self {
        Self {
            group: config.group.clone(),
            members: config.members.clone(),
            ..Self::default()
        }
    }

    /// Individual member names, trimmed, empties dropped.
    pub fn member_list(&self) -> Vec<String> {
        split_list(&self.members)
    }

    /// Whether there is enough data to plot: two axis names and a row.
    pub fn is_chartable(&self) -> bool {
        self.variables.len() >= 2 && !self.rows.is_empty()
    }
}

/// Why a data row was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("value {0:?} is not a number")]
    NotANumber(String),

    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
}

/// Split a comma-separated answer into trimmed, non-empty entries.
pub fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Remove every member whose name contains any of the comma-separated
/// fragments in `removals` (case-insensitive). Returns the new roster text.
pub fn remove_members(members: &str, removals: &str) -> String {
    let fragments: Vec<String> = split_list(removals)
        .into_iter()
        .map(|f| f.to_lowercase())
        .collect();

    split_list(members)
        .into_iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            !fragments.iter().any(|f| lower.contains(f.as_str()))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse one data row. Every token must be a finite number and the row must
/// carry exactly one value per declared variable.
pub fn parse_row(input: &str, arity: usize) -> Result<Vec<f64>, RowError> {
    let mut row = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        let value: f64 = token
            .parse()
            .map_err(|_| RowError::NotANumber(token.to_string()))?;
        if !value.is_finite() {
            return Err(RowError::NotANumber(token.to_string()));
        }
        row.push(value);
    }

    if row.len() != arity {
        return Err(RowError::Arity {
            expected: arity,
            got: row.len(),
        });
    }
    Ok(row)
}

/// Case-insensitive, whitespace-tolerant match of a literal keyword answer.
pub fn is_keyword(input: &str, keyword: &str) -> bool {
    input.trim().eq_ignore_ascii_case(keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_is_case_insensitive_substring() {
        assert_eq!(remove_members("Ana, Luis, Pedro", "luis"), "Ana, Pedro");
        assert_eq!(remove_members("Ana, Luis, Pedro", "PE"), "Ana, Luis");
    }

    #[test]
    fn removal_accepts_several_fragments() {
        assert_eq!(
            remove_members("Ana Gómez, Luis Díaz, Pedro Ruiz", "ana, ruiz"),
            "Luis Díaz"
        );
    }

    #[test]
    fn removal_ignores_empty_fragments() {
        assert_eq!(remove_members("Ana, Luis", "luis, "), "Ana");
        assert_eq!(remove_members("Ana, Luis", " , "), "Ana, Luis");
    }

    #[test]
    fn removal_without_match_keeps_everyone() {
        assert_eq!(remove_members("Ana,Luis", "zoe"), "Ana, Luis");
    }

    #[test]
    fn parse_row_accepts_numbers() {
        assert_eq!(parse_row("1.5, 0.2", 2).unwrap(), vec![1.5, 0.2]);
        assert_eq!(parse_row(" -3 ,1e2,0 ", 3).unwrap(), vec![-3.0, 100.0, 0.0]);
    }

    #[test]
    fn parse_row_rejects_any_bad_token() {
        assert_eq!(
            parse_row("1.5, abc", 2),
            Err(RowError::NotANumber("abc".into()))
        );
        assert!(parse_row("1.5,", 2).is_err());
        assert!(parse_row("NaN, 1", 2).is_err());
        assert!(parse_row("inf, 1", 2).is_err());
    }

    #[test]
    fn parse_row_checks_arity() {
        assert_eq!(
            parse_row("1, 2, 3", 2),
            Err(RowError::Arity { expected: 2, got: 3 })
        );
    }

    #[test]
    fn keyword_match_trims_and_ignores_case() {
        assert!(is_keyword("  FIN ", "fin"));
        assert!(is_keyword("No", "no"));
        assert!(!is_keyword("nope", "no"));
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list("Voltaje (V), Corriente (A),"),
            vec!["Voltaje (V)".to_string(), "Corriente (A)".to_string()]
        );
    }

    #[test]
    fn chartable_needs_two_variables_and_a_row() {
        let mut data = ReportData::default();
        data.variables = vec!["x".into()];
        data.rows = vec![vec![1.0]];
        assert!(!data.is_chartable());
        data.variables.push("y".into());
        data.rows = vec![];
        assert!(!data.is_chartable());
        data.rows.push(vec![1.0, 2.0]);
        assert!(data.is_chartable());
    }

    #[test]
    fn from_roster_prefills_group_and_members() {
        let config = ChatConfig::new(ChatId(7), "G3", "Ana, Luis");
        let data = ReportData::from_roster(&config);
        assert_eq!(data.group, "G3");
        assert_eq!(data.member_list(), vec!["Ana", "Luis"]);
        assert!(data.title.is_empty());
    }
}
