//! Certificate placeholder substitution and email message templates.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::table::{ColumnIndex, RowRecord, columns};

/// Fixed values printed on every certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConstants {
    /// Name of the signing lead.
    pub lead_name: String,
    /// Title of the signing lead.
    pub title: String,
    /// Team or chapter name.
    pub team_name: String,
}

impl Default for CertificateConstants {
    fn default() -> Self {
        Self {
            lead_name: "Head".to_string(),
            title: "Student Body Chapter".to_string(),
            team_name: "CSI".to_string(),
        }
    }
}

/// A verbatim find/replace to apply to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    /// Exact text to search for.
    pub find: String,
    /// Replacement text.
    pub replace_with: String,
    /// Whether matching is case-sensitive.
    pub match_case: bool,
}

impl TextReplacement {
    /// Creates a case-sensitive replacement.
    pub fn exact(find: impl Into<String>, replace_with: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace_with: replace_with.into(),
            match_case: true,
        }
    }
}

/// Where a placeholder's replacement comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionSource {
    /// The row's cell under this header.
    Column(String),
    /// A fixed value.
    Constant(String),
}

/// One placeholder token and its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Token as it appears in the template document.
    pub token: String,
    /// Replacement source.
    pub source: SubstitutionSource,
}

/// Ordered placeholder table for certificate templates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: Vec<Substitution>,
}

impl SubstitutionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard certificate placeholders.
    pub fn certificate(constants: &CertificateConstants) -> Self {
        Self::new()
            .with_column("Receiver Name", columns::NAME)
            .with_column("Description", columns::DESCRIPTION)
            .with_column("Date Issued", columns::DATE)
            .with_constant("Your Name", &constants.lead_name)
            .with_constant("Title", &constants.title)
            .with_constant("Team Name", &constants.team_name)
    }

    /// Adds a placeholder filled from a row column.
    pub fn with_column(mut self, token: impl Into<String>, column: impl Into<String>) -> Self {
        self.entries.push(Substitution {
            token: token.into(),
            source: SubstitutionSource::Column(column.into()),
        });
        self
    }

    /// Adds a placeholder filled with a constant.
    pub fn with_constant(mut self, token: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push(Substitution {
            token: token.into(),
            source: SubstitutionSource::Constant(value.into()),
        });
        self
    }

    /// Resolves every placeholder against a row.
    pub fn resolve(&self, row: &RowRecord<'_>, index: &ColumnIndex) -> Vec<TextReplacement> {
        self.entries
            .iter()
            .map(|entry| {
                let value = match &entry.source {
                    SubstitutionSource::Column(c) => row.field(index, c).to_string(),
                    SubstitutionSource::Constant(v) => v.clone(),
                };
                TextReplacement::exact(&entry.token, value)
            })
            .collect()
    }
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(event|name|date|sender)\}").expect("valid placeholder regex"));

/// Values interpolated into a delivery message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageVars {
    /// Event name.
    pub event: String,
    /// Recipient name.
    pub name: String,
    /// Event date.
    pub date: String,
    /// Sender display name used in the signature.
    pub sender: String,
}

/// A rendered subject and plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

/// Subject/body template with `{event}`, `{name}`, `{date}` and `{sender}`
/// placeholders. Unknown braces are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            subject: "Certificate of Participation – {event}".to_string(),
            body: "Dear {name},\n\n\
                   Thank you for attending {event} on {date}.\n\
                   Please find your certificate attached.\n\n\
                   Regards,\n\
                   {sender}\n"
                .to_string(),
        }
    }
}

impl MessageTemplate {
    /// Renders the template.
    pub fn render(&self, vars: &MessageVars) -> RenderedMessage {
        RenderedMessage {
            subject: interpolate(&self.subject, vars),
            body: interpolate(&self.body, vars),
        }
    }
}

fn interpolate(template: &str, vars: &MessageVars) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "event" => vars.event.clone(),
            "name" => vars.name.clone(),
            "date" => vars.date.clone(),
            "sender" => vars.sender.clone(),
            other => format!("{{{other}}}"),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn sample_table() -> Table {
        let rows = vec![
            vec!["Name", "Date", "Description", "Status"],
            vec!["Ada Lovelace", "2024-03-15", "Hackathon winner", ""],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(String::from).collect())
        .collect();
        Table::from_rows("Sheet1", rows).unwrap()
    }

    #[test]
    fn certificate_table_order() {
        let sheet = sample_table();
        let index = sheet.column_index(&[columns::NAME]).unwrap();
        let row = sheet.rows().next().unwrap();
        let table = SubstitutionTable::certificate(&CertificateConstants::default());
        let tokens: Vec<String> = table
            .resolve(&row, &index)
            .into_iter()
            .map(|r| r.find)
            .collect();
        assert_eq!(
            tokens,
            vec![
                "Receiver Name",
                "Description",
                "Date Issued",
                "Your Name",
                "Title",
                "Team Name"
            ]
        );
    }

    #[test]
    fn resolve_reads_row_and_constants() {
        let sheet = sample_table();
        let index = sheet
            .column_index(&[columns::NAME, columns::DATE, columns::DESCRIPTION])
            .unwrap();
        let row = sheet.rows().next().unwrap();
        let subs = SubstitutionTable::certificate(&CertificateConstants::default());

        let replacements = subs.resolve(&row, &index);
        assert_eq!(replacements[0], TextReplacement::exact("Receiver Name", "Ada Lovelace"));
        assert_eq!(replacements[2], TextReplacement::exact("Date Issued", "2024-03-15"));
        assert_eq!(replacements[5], TextReplacement::exact("Team Name", "CSI"));
        assert!(replacements.iter().all(|r| r.match_case));
    }

    #[test]
    fn default_message_template() {
        let rendered = MessageTemplate::default().render(&MessageVars {
            event: "RustConf".into(),
            name: "Ada".into(),
            date: "2024-03-15".into(),
            sender: "CSI PCE".into(),
        });
        assert_eq!(rendered.subject, "Certificate of Participation – RustConf");
        assert!(rendered.body.starts_with("Dear Ada,\n"));
        assert!(rendered.body.contains("attending RustConf on 2024-03-15."));
        assert!(rendered.body.ends_with("Regards,\nCSI PCE\n"));
    }

    #[test]
    fn unknown_placeholders_survive() {
        let template = MessageTemplate {
            subject: "{event} {venue}".into(),
            body: String::new(),
        };
        let rendered = template.render(&MessageVars {
            event: "Meetup".into(),
            ..Default::default()
        });
        assert_eq!(rendered.subject, "Meetup {venue}");
    }
}
