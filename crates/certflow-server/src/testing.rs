//! In-memory service fakes shared by the unit tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use certflow_core::{RangeUpdate, TextReplacement};
use certflow_providers::{
    BoxFuture, DeliveryApi, DocumentApi, DriveFile, OutgoingMessage, ProviderError,
    ProviderResult, SpreadsheetApi, Workspace,
};

pub fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// Splits `'Sheet'!C2:C4` into zero-based (column, row) of the top-left cell.
fn top_left(range: &str) -> (usize, usize) {
    let cells = range.rsplit('!').next().unwrap_or(range);
    let first = cells.split(':').next().unwrap_or(cells);
    let letters: String = first.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits: String = first.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    let column = letters
        .chars()
        .fold(0usize, |acc, c| acc * 26 + (c as usize - 'A' as usize + 1))
        - 1;
    let row = digits.parse::<usize>().unwrap_or(1) - 1;
    (column, row)
}

/// A single-tab spreadsheet.
#[derive(Default)]
pub struct MemorySheets {
    pub grid: Mutex<Vec<Vec<String>>>,
    pub reads: Mutex<Vec<String>>,
    pub writes: Mutex<Vec<Vec<RangeUpdate>>>,
    pub cleared: Mutex<Vec<String>>,
}

impl MemorySheets {
    pub fn with_grid(rows: &[&[&str]]) -> Self {
        Self {
            grid: Mutex::new(grid(rows)),
            ..Default::default()
        }
    }

    pub fn cell(&self, column: usize, row: usize) -> String {
        self.grid
            .lock()
            .unwrap()
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default()
    }

    fn put(&self, range: &str, values: &[Vec<String>]) {
        let (column, row) = top_left(range);
        let mut grid = self.grid.lock().unwrap();
        for (dy, line) in values.iter().enumerate() {
            while grid.len() <= row + dy {
                grid.push(Vec::new());
            }
            let target = &mut grid[row + dy];
            for (dx, value) in line.iter().enumerate() {
                while target.len() <= column + dx {
                    target.push(String::new());
                }
                target[column + dx] = value.clone();
            }
        }
    }
}

impl SpreadsheetApi for MemorySheets {
    fn read_range<'a>(
        &'a self,
        _spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<Vec<String>>>> {
        Box::pin(async move {
            self.reads.lock().unwrap().push(range.to_string());
            Ok(self.grid.lock().unwrap().clone())
        })
    }

    fn write_ranges<'a>(
        &'a self,
        _spreadsheet_id: &'a str,
        updates: &'a [RangeUpdate],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            for update in updates {
                self.put(&update.range, &update.values);
            }
            self.writes.lock().unwrap().push(updates.to_vec());
            Ok(())
        })
    }

    fn clear_range<'a>(
        &'a self,
        _spreadsheet_id: &'a str,
        range: &'a str,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.cleared.lock().unwrap().push(range.to_string());
            self.grid.lock().unwrap().clear();
            Ok(())
        })
    }

    fn update_range<'a>(
        &'a self,
        _spreadsheet_id: &'a str,
        range: &'a str,
        values: &'a [Vec<String>],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.put(range, values);
            Ok(())
        })
    }
}

/// A drive of presentations whose text is a plain string.
#[derive(Default)]
pub struct MemoryDocuments {
    /// (id, name, parent, text)
    pub files: Mutex<Vec<(String, String, String, String)>>,
    pub duplicated: Mutex<Vec<String>>,
    pub substitutions: Mutex<Vec<(String, Vec<TextReplacement>)>>,
    pub exported: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
    /// Names for which `duplicate` fails.
    pub fail_duplicate: Mutex<HashSet<String>>,
    pub fail_substitute: bool,
    /// Time `substitute_text` takes.
    pub substitute_delay: Option<Duration>,
}

impl MemoryDocuments {
    pub fn with_file(id: &str, name: &str, parent: &str, text: &str) -> Self {
        let docs = Self::default();
        docs.files.lock().unwrap().push((
            id.to_string(),
            name.to_string(),
            parent.to_string(),
            text.to_string(),
        ));
        docs
    }

    pub fn text_of(&self, id: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.0 == id)
            .map(|f| f.3.clone())
    }

    pub fn children_of(&self, parent: &str) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.2 == parent)
            .map(|f| f.0.clone())
            .collect()
    }
}

impl DocumentApi for MemoryDocuments {
    fn duplicate<'a>(
        &'a self,
        source_id: &'a str,
        parent_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            if self.fail_duplicate.lock().unwrap().contains(name) {
                return Err(ProviderError::bad_request(format!("cannot copy for {}", name)));
            }
            let text = self
                .text_of(source_id)
                .ok_or_else(|| ProviderError::not_found(source_id.to_string()))?;
            let mut files = self.files.lock().unwrap();
            let id = format!("copy-{}", files.len());
            files.push((id.clone(), name.to_string(), parent_id.to_string(), text));
            self.duplicated.lock().unwrap().push(name.to_string());
            Ok(id)
        })
    }

    fn substitute_text<'a>(
        &'a self,
        document_id: &'a str,
        replacements: &'a [TextReplacement],
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            if let Some(delay) = self.substitute_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_substitute {
                return Err(ProviderError::bad_request("substitution rejected"));
            }
            self.substitutions
                .lock()
                .unwrap()
                .push((document_id.to_string(), replacements.to_vec()));
            let mut files = self.files.lock().unwrap();
            let file = files
                .iter_mut()
                .find(|f| f.0 == document_id)
                .ok_or_else(|| ProviderError::not_found(document_id.to_string()))?;
            // Replace-all in request order, as the presentation service applies a batch.
            for r in replacements.iter().filter(|r| !r.find.is_empty()) {
                file.3 = file.3.replace(&r.find, &r.replace_with);
            }
            Ok(())
        })
    }

    fn export_as<'a>(
        &'a self,
        document_id: &'a str,
        _mime_type: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<u8>>> {
        Box::pin(async move {
            self.exported.lock().unwrap().push(document_id.to_string());
            let text = self.text_of(document_id).unwrap_or_default();
            Ok(format!("%PDF {}", text).into_bytes())
        })
    }

    fn list_children<'a>(
        &'a self,
        folder_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<DriveFile>>> {
        Box::pin(async move {
            Ok(self
                .files
                .lock()
                .unwrap()
                .iter()
                .filter(|f| f.2 == folder_id)
                .map(|f| DriveFile {
                    id: f.0.clone(),
                    name: f.1.clone(),
                })
                .collect())
        })
    }

    fn delete<'a>(&'a self, file_id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(async move {
            self.files.lock().unwrap().retain(|f| f.0 != file_id);
            self.deleted.lock().unwrap().push(file_id.to_string());
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MemoryMailer {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub fail_for: Mutex<HashSet<String>>,
}

impl DeliveryApi for MemoryMailer {
    fn send<'a>(&'a self, message: &'a OutgoingMessage) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            if self.fail_for.lock().unwrap().contains(&message.to.address) {
                return Err(ProviderError::server("smtp relay unavailable"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(message.clone());
            Ok(format!("msg-{}", sent.len()))
        })
    }
}

/// The three fakes plus a [`Workspace`] view over them.
pub struct Fakes {
    pub sheets: Arc<MemorySheets>,
    pub documents: Arc<MemoryDocuments>,
    pub mailer: Arc<MemoryMailer>,
}

impl Fakes {
    pub fn new(sheets: MemorySheets, documents: MemoryDocuments) -> Self {
        Self {
            sheets: Arc::new(sheets),
            documents: Arc::new(documents),
            mailer: Arc::new(MemoryMailer::default()),
        }
    }

    pub fn workspace(&self) -> Workspace {
        Workspace {
            sheets: self.sheets.clone(),
            documents: self.documents.clone(),
            delivery: self.mailer.clone(),
        }
    }
}

#[test]
fn top_left_parses_quoted_ranges() {
    assert_eq!(top_left("'Sheet 1'!C2:C4"), (2, 1));
    assert_eq!(top_left("'S'!A1"), (0, 0));
    assert_eq!(top_left("'S'!AB10"), (27, 9));
}
