//! What kind of document are we reading, and in what language?

use std::fmt;

use schemars::JsonSchema;

use crate::{pages::PageSelection, prelude::*};

use super::error::IntakeError;

/// The kind of document a request claims to contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Front of a national identity card.
    CniFront,
    /// Back of a national identity card.
    CniBack,
    /// An employment contract, possibly several pages long.
    WorkContract,
    /// A résumé or CV.
    Resume,
    /// Anything else.
    Generic,
}

impl DocumentKind {
    /// The wire name of this kind, as used in URLs and prompt file names.
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::CniFront => "cni_front",
            DocumentKind::CniBack => "cni_back",
            DocumentKind::WorkContract => "work_contract",
            DocumentKind::Resume => "resume",
            DocumentKind::Generic => "generic",
        }
    }

    /// Is this an identity document? Those require a language.
    pub fn is_identity(self) -> bool {
        match self {
            DocumentKind::CniFront | DocumentKind::CniBack => true,
            DocumentKind::WorkContract | DocumentKind::Resume | DocumentKind::Generic => false,
        }
    }

    /// May this kind be uploaded as a ZIP archive?
    pub fn bulk_eligible(self) -> bool {
        match self {
            DocumentKind::CniFront | DocumentKind::CniBack | DocumentKind::WorkContract => true,
            DocumentKind::Resume | DocumentKind::Generic => false,
        }
    }

    /// Which pages should we OCR?
    pub fn page_selection(self) -> PageSelection {
        match self {
            DocumentKind::WorkContract => PageSelection::All,
            DocumentKind::CniFront
            | DocumentKind::CniBack
            | DocumentKind::Resume
            | DocumentKind::Generic => PageSelection::First,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The language of an identity document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CniLanguage {
    Fr,
    En,
    Ar,
    Es,
    De,
}

impl CniLanguage {
    /// The wire name of this language.
    pub fn as_str(self) -> &'static str {
        match self {
            CniLanguage::Fr => "fr",
            CniLanguage::En => "en",
            CniLanguage::Ar => "ar",
            CniLanguage::Es => "es",
            CniLanguage::De => "de",
        }
    }

    /// The English name of this language, for prompts.
    pub fn english_name(self) -> &'static str {
        match self {
            CniLanguage::Fr => "French",
            CniLanguage::En => "English",
            CniLanguage::Ar => "Arabic",
            CniLanguage::Es => "Spanish",
            CniLanguage::De => "German",
        }
    }
}

impl fmt::Display for CniLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request to read one or more documents of the same kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocumentRequest {
    kind: DocumentKind,
    language: Option<CniLanguage>,
}

impl DocumentRequest {
    /// Validate a kind and an optional language.
    ///
    /// Identity documents must have a language. Other kinds ignore it.
    pub fn validate(
        kind: DocumentKind,
        language: Option<CniLanguage>,
    ) -> Result<Self, IntakeError> {
        if kind.is_identity() {
            match language {
                Some(language) => Ok(Self {
                    kind,
                    language: Some(language),
                }),
                None => Err(IntakeError::MissingLanguage),
            }
        } else {
            Ok(Self {
                kind,
                language: None,
            })
        }
    }

    /// The document kind.
    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    /// The language, present only for identity documents.
    pub fn language(&self) -> Option<CniLanguage> {
        self.language
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_KINDS: [DocumentKind; 5] = [
        DocumentKind::CniFront,
        DocumentKind::CniBack,
        DocumentKind::WorkContract,
        DocumentKind::Resume,
        DocumentKind::Generic,
    ];

    #[test]
    fn identity_documents_need_a_language() {
        for kind in [DocumentKind::CniFront, DocumentKind::CniBack] {
            assert!(matches!(
                DocumentRequest::validate(kind, None),
                Err(IntakeError::MissingLanguage)
            ));
            let req = DocumentRequest::validate(kind, Some(CniLanguage::Ar)).unwrap();
            assert_eq!(req.language(), Some(CniLanguage::Ar));
        }
    }

    #[test]
    fn other_kinds_drop_the_language() {
        let req =
            DocumentRequest::validate(DocumentKind::WorkContract, Some(CniLanguage::Fr)).unwrap();
        assert_eq!(req.kind(), DocumentKind::WorkContract);
        assert_eq!(req.language(), None);
    }

    #[test]
    fn bulk_eligibility() {
        let eligible = ALL_KINDS
            .into_iter()
            .filter(|kind| kind.bulk_eligible())
            .collect::<Vec<_>>();
        assert_eq!(
            eligible,
            vec![
                DocumentKind::CniFront,
                DocumentKind::CniBack,
                DocumentKind::WorkContract
            ]
        );
    }

    #[test]
    fn wire_names_match_serde() {
        for kind in ALL_KINDS {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        let lang: CniLanguage = serde_json::from_value(json!("de")).unwrap();
        assert_eq!(lang, CniLanguage::De);
    }
}
