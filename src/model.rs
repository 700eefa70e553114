//! Records stored in the content repository and the paths they live at.

use std::{fmt, str::FromStr};

use chrono::{FixedOffset, Offset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Polarity of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Natureza {
    Positiva,
    Negativa,
}

impl Natureza {
    /// Value used in request bodies and stored documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Natureza::Positiva => "positiva",
            Natureza::Negativa => "negativa",
        }
    }

    /// Folder under `referencias/` holding this polarity.
    pub fn folder(self) -> &'static str {
        match self {
            Natureza::Positiva => "positivas",
            Natureza::Negativa => "negativas",
        }
    }

    /// Prefix of reference ids, e.g. `pos` in `pos-0001`.
    pub fn prefix(self) -> &'static str {
        match self {
            Natureza::Positiva => "pos",
            Natureza::Negativa => "neg",
        }
    }

    /// Infer the polarity from a reference id. Anything not starting with
    /// `pos-` is treated as negative.
    pub fn from_reference_id(id: &str) -> Self {
        if id.starts_with("pos-") {
            Natureza::Positiva
        } else {
            Natureza::Negativa
        }
    }
}

impl fmt::Display for Natureza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Natureza {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positiva" => Ok(Natureza::Positiva),
            "negativa" => Ok(Natureza::Negativa),
            other => Err(format!("unknown natureza: {other}")),
        }
    }
}

/// Moderation state of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Pendente,
    Aprovada,
}

/// A community submitted reference.
///
/// ```json
/// {
///   "id": "pos-0001",
///   "natureza": "positiva",
///   "titulo": "Curso X",
///   "empresaOuResponsavel": "Fulano",
///   "area": "Testes",
///   "descricao": "...",
///   "aspectosSelecionados": ["didática"],
///   "dataRegistro": "2025-01-31T12:00:00.000Z",
///   "status": "pendente"
/// }
/// ```
///
/// Fields the board does not know about are kept in `extra` so documents
/// round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    pub natureza: Natureza,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_indicacao: Option<String>,
    #[serde(default)]
    pub titulo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nome: Option<String>,
    #[serde(default)]
    pub empresa_ou_responsavel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default)]
    pub area: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valor: Option<String>,
    #[serde(default)]
    pub descricao: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aspectos_selecionados: Vec<String>,
    #[serde(default)]
    pub data_registro: String,
    #[serde(default)]
    pub status: Status,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A comment left on a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub autor: String,
    #[serde(default)]
    pub texto: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub data: String,
    /// Fields written by other clients, kept on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Comment {
    /// Build a comment stamped with the current local time. A missing or
    /// blank author is recorded as `Anônimo`.
    pub fn new(autor: Option<String>, texto: String, email: String) -> Self {
        let autor = autor
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string());
        Self {
            autor,
            texto,
            email,
            data: local_timestamp(),
            extra: Map::new(),
        }
    }
}

/// A vote for a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub data: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Vote {
    pub fn new(email: String) -> Self {
        Self {
            email,
            data: local_timestamp(),
            extra: Map::new(),
        }
    }
}

const ANONYMOUS: &str = "Anônimo";

/// Folder holding every reference of one polarity.
pub fn references_dir(natureza: Natureza) -> String {
    format!("referencias/{}", natureza.folder())
}

pub fn reference_path(natureza: Natureza, id: &str) -> String {
    format!("{}/{id}.json", references_dir(natureza))
}

pub fn comments_path(natureza: Natureza, id: &str) -> String {
    format!("{}/comentarios/{id}.json", references_dir(natureza))
}

pub fn votes_path(natureza: Natureza, id: &str) -> String {
    format!("{}/votos/{id}.json", references_dir(natureza))
}

/// UTC registration time, e.g. `2025-01-31T12:00:00.000Z`.
pub fn registration_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// São Paulo wall-clock time as `dd/mm/yyyy, HH:MM:SS`.
pub fn local_timestamp() -> String {
    // Brazil dropped daylight saving time in 2019.
    let offset = FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix());
    Utc::now()
        .with_timezone(&offset)
        .format("%d/%m/%Y, %H:%M:%S")
        .to_string()
}
