use serde::{Deserialize, Serialize};

/// Spreadsheet formats the interpreter backend can load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SheetSuffix {
    Xlsx,
    Xls,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub data: String,
}

/// An uploaded sheet the backend should make available to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub suffix: SheetSuffix,
    pub sheet_name: String,
    pub file_path: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}

/// One typed part of a multi-part prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text(Text),
    Sheet(Sheet),
    Image(Image),
}

impl Content {
    pub fn text<S: Into<String>>(data: S) -> Self {
        Content::Text(Text { data: data.into() })
    }

    pub fn sheet<S: Into<String>>(
        suffix: SheetSuffix,
        sheet_name: S,
        file_path: S,
        tenant_id: S,
    ) -> Self {
        Content::Sheet(Sheet {
            suffix,
            sheet_name: sheet_name.into(),
            file_path: file_path.into(),
            tenant_id: tenant_id.into(),
        })
    }

    pub fn image<S: Into<String>>(url: S) -> Self {
        Content::Image(Image { url: url.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.data),
            _ => None,
        }
    }

    pub fn as_sheet(&self) -> Option<&Sheet> {
        match self {
            Content::Sheet(sheet) => Some(sheet),
            _ => None,
        }
    }
}
