use serde::{Deserialize, Serialize};

/// Report file formats the extension knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FilterField {
    pub name: String,
    pub value: String,
}

impl FilterField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTab {
    #[serde(rename = "tab")]
    pub tab_id: String,
    #[serde(default)]
    pub fields: Vec<FilterField>,
}

/// The report request handed to the extension.
///
/// Tabs are identified by position only; two tabs may share a `tab_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(rename = "reportname")]
    pub report_name: String,
    #[serde(rename = "fileType", default)]
    pub file_type: FileType,
    #[serde(default)]
    pub filters: Vec<FilterTab>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigEditError {
    #[error("tab index {0} out of range")]
    TabOutOfRange(usize),
    #[error("field index {field} out of range for tab {tab}")]
    FieldOutOfRange { tab: usize, field: usize },
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            report_name: "9.1.06".to_string(),
            file_type: FileType::Html,
            filters: vec![
                FilterTab {
                    tab_id: "docent".to_string(),
                    fields: vec![FilterField::new("rol", "EXAMINATOR")],
                },
                FilterTab {
                    tab_id: "cursus".to_string(),
                    fields: vec![
                        FilterField::new("collegejaar", "2024"),
                        FilterField::new("cursus", "TICT-AFSTUD-19"),
                    ],
                },
            ],
        }
    }
}

impl ReportConfig {
    pub fn set_report_name(&mut self, name: impl Into<String>) {
        self.report_name = name.into();
    }

    /// Appends an empty tab and returns its index.
    pub fn add_tab(&mut self, tab_id: impl Into<String>) -> usize {
        self.filters.push(FilterTab {
            tab_id: tab_id.into(),
            fields: Vec::new(),
        });
        self.filters.len() - 1
    }

    pub fn remove_tab(&mut self, tab: usize) -> Result<FilterTab, ConfigEditError> {
        if tab >= self.filters.len() {
            return Err(ConfigEditError::TabOutOfRange(tab));
        }
        Ok(self.filters.remove(tab))
    }

    /// Appends a blank field to `tab` and returns the field index.
    pub fn add_field(&mut self, tab: usize) -> Result<usize, ConfigEditError> {
        let t = self.tab_mut(tab)?;
        t.fields.push(FilterField::default());
        Ok(t.fields.len() - 1)
    }

    pub fn update_field(
        &mut self,
        tab: usize,
        field: usize,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<(), ConfigEditError> {
        let t = self.tab_mut(tab)?;
        let f = t
            .fields
            .get_mut(field)
            .ok_or(ConfigEditError::FieldOutOfRange { tab, field })?;
        if let Some(n) = name {
            f.name = n.to_string();
        }
        if let Some(v) = value {
            f.value = v.to_string();
        }
        Ok(())
    }

    /// Removes one field; later fields of the same tab shift down by one.
    pub fn remove_field(&mut self, tab: usize, field: usize) -> Result<FilterField, ConfigEditError> {
        let t = self.tab_mut(tab)?;
        if field >= t.fields.len() {
            return Err(ConfigEditError::FieldOutOfRange { tab, field });
        }
        Ok(t.fields.remove(field))
    }

    /// `(tab, field)` positions whose name or value is still blank.
    pub fn blank_fields(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (ti, t) in self.filters.iter().enumerate() {
            for (fi, f) in t.fields.iter().enumerate() {
                if f.name.trim().is_empty() || f.value.trim().is_empty() {
                    out.push((ti, fi));
                }
            }
        }
        out
    }

    fn tab_mut(&mut self, tab: usize) -> Result<&mut FilterTab, ConfigEditError> {
        self.filters
            .get_mut(tab)
            .ok_or(ConfigEditError::TabOutOfRange(tab))
    }
}
