//! Analysis request descriptor

/// One uploaded document sent for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDocument {
    /// Original file name
    pub name: String,
    /// MIME type (`image/jpeg`, `application/pdf`, ...)
    pub mime_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl InputDocument {
    /// Create input document
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// What to send to the generative backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// Documents to analyze
    pub documents: Vec<InputDocument>,
    /// Extra instructions appended to the prompt
    pub instructions: Option<String>,
}

impl AnalysisRequest {
    /// Create request for `documents`
    #[inline]
    #[must_use]
    pub fn new(documents: Vec<InputDocument>) -> Self {
        Self {
            documents,
            instructions: None,
        }
    }

    /// With instructions
    #[inline]
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Whether any document carries data
    #[inline]
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.documents.iter().any(|d| !d.data.is_empty())
    }
}
