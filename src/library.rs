//! In-memory collection of uploaded documents.
//!
//! Keeps insertion order (the order documents are presented to the model)
//! and guarantees unique names so `@mentions` never match two uploads of the
//! same file.

use crate::document::{
    name_key, strip_pdf_extension, DocumentId, DocumentStatus, ProcessedDocument,
};
use crate::error::PdfChatError;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct DocumentLibrary {
    documents: Vec<ProcessedDocument>,
}

impl DocumentLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an upload in the `Processing` state and return its id.
    ///
    /// The stored name is made unique by appending ` (2)`, ` (3)`, …
    pub fn begin(&mut self, name: &str) -> DocumentId {
        let doc = ProcessedDocument::pending(self.unique_name(name));
        let id = doc.id;
        debug!("Registered '{}' as {}", doc.name, id);
        self.documents.push(doc);
        id
    }

    /// Replace a `Processing` entry with the finished document.
    ///
    /// The entry keeps its id, name and position; the result is `Ready`.
    pub fn complete(
        &mut self,
        id: DocumentId,
        mut doc: ProcessedDocument,
    ) -> Result<&ProcessedDocument, PdfChatError> {
        let slot = self.slot_mut(id)?;
        doc.id = slot.id;
        doc.name = std::mem::take(&mut slot.name);
        doc.status = DocumentStatus::Ready;
        *slot = doc;
        info!("Document '{}' ready ({} pages)", slot.name, slot.pages.len());
        Ok(slot)
    }

    /// Mark an entry as failed. Its pages are dropped.
    pub fn fail(&mut self, id: DocumentId, reason: impl Into<String>) -> Result<(), PdfChatError> {
        let slot = self.slot_mut(id)?;
        slot.pages.clear();
        slot.status = DocumentStatus::Failed {
            reason: reason.into(),
        };
        Ok(())
    }

    /// Add a finished document directly, renaming it if the name is taken.
    pub fn insert(&mut self, mut doc: ProcessedDocument) -> DocumentId {
        doc.name = self.unique_name(&doc.name);
        let id = doc.id;
        self.documents.push(doc);
        id
    }

    pub fn remove(&mut self, id: DocumentId) -> Option<ProcessedDocument> {
        let pos = self.documents.iter().position(|d| d.id == id)?;
        Some(self.documents.remove(pos))
    }

    pub fn remove_by_name(&mut self, name: &str) -> Result<ProcessedDocument, PdfChatError> {
        let id = self
            .find_by_name(name)
            .map(|d| d.id)
            .ok_or_else(|| PdfChatError::DocumentNotFound {
                name: name.to_string(),
            })?;
        self.remove(id).ok_or_else(|| PdfChatError::DocumentNotFound {
            name: name.to_string(),
        })
    }

    pub fn get(&self, id: DocumentId) -> Option<&ProcessedDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    /// Case-insensitive lookup; the `.pdf` extension is optional on both sides.
    pub fn find_by_name(&self, name: &str) -> Option<&ProcessedDocument> {
        let wanted = name_key(name);
        self.documents.iter().find(|d| d.name_key() == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessedDocument> {
        self.documents.iter()
    }

    /// Documents that can be used as chat context, in insertion order.
    pub fn ready(&self) -> Vec<&ProcessedDocument> {
        self.documents.iter().filter(|d| d.is_ready()).collect()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }

    fn slot_mut(&mut self, id: DocumentId) -> Result<&mut ProcessedDocument, PdfChatError> {
        self.documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| PdfChatError::DocumentNotFound {
                name: id.to_string(),
            })
    }

    fn unique_name(&self, name: &str) -> String {
        let taken = |candidate: &str| {
            let key = name_key(candidate);
            self.documents.iter().any(|d| d.name_key() == key)
        };
        if !taken(name) {
            return name.to_string();
        }

        let stem = strip_pdf_extension(name);
        let ext = &name[stem.len()..];
        (2..)
            .map(|n| format!("{stem} ({n}){ext}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_doc(name: &str) -> ProcessedDocument {
        let mut d = ProcessedDocument::pending(name);
        d.status = DocumentStatus::Ready;
        d
    }

    #[test]
    fn begin_then_complete_keeps_id_and_name() {
        let mut lib = DocumentLibrary::new();
        let id = lib.begin("report.pdf");
        assert_eq!(lib.get(id).unwrap().status, DocumentStatus::Processing);
        assert!(lib.ready().is_empty());

        let finished = ProcessedDocument::pending("/tmp/xyz.pdf");
        let stored = lib.complete(id, finished).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "report.pdf");
        assert!(stored.is_ready());
        assert_eq!(lib.ready().len(), 1);
    }

    #[test]
    fn fail_marks_entry() {
        let mut lib = DocumentLibrary::new();
        let id = lib.begin("broken.pdf");
        lib.fail(id, "corrupt").unwrap();
        assert!(matches!(
            lib.get(id).unwrap().status,
            DocumentStatus::Failed { ref reason } if reason == "corrupt"
        ));
        assert!(lib.ready().is_empty());
    }

    #[test]
    fn duplicate_names_are_suffixed() {
        let mut lib = DocumentLibrary::new();
        lib.insert(ready_doc("notes.pdf"));
        let second = lib.insert(ready_doc("Notes.pdf"));
        let third = lib.begin("notes.pdf");
        assert_eq!(lib.get(second).unwrap().name, "Notes (2).pdf");
        assert_eq!(lib.get(third).unwrap().name, "notes (3).pdf");
    }

    #[test]
    fn find_and_remove_by_name() {
        let mut lib = DocumentLibrary::new();
        lib.insert(ready_doc("Annual Report.pdf"));
        assert!(lib.find_by_name("annual report").is_some());
        assert!(lib.find_by_name("ANNUAL REPORT.PDF").is_some());

        let removed = lib.remove_by_name("annual report").unwrap();
        assert_eq!(removed.name, "Annual Report.pdf");
        assert!(lib.is_empty());
        assert!(matches!(
            lib.remove_by_name("annual report"),
            Err(PdfChatError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn names_differing_only_in_unicode_case_are_suffixed() {
        let mut lib = DocumentLibrary::new();
        lib.insert(ready_doc("Émile.pdf"));
        let second = lib.insert(ready_doc("émile.pdf"));
        assert_eq!(lib.get(second).unwrap().name, "émile (2).pdf");
        assert_eq!(lib.find_by_name("ÉMILE").unwrap().name, "Émile.pdf");
    }

    #[test]
    fn complete_unknown_id_errors() {
        let mut lib = DocumentLibrary::new();
        let err = lib
            .complete(DocumentId::new(), ProcessedDocument::pending("x.pdf"))
            .unwrap_err();
        assert!(matches!(err, PdfChatError::DocumentNotFound { .. }));
    }
}
