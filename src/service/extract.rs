use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::models::UploadedFile;

/// Pulls readable text out of an uploaded file. Plain-text formats are
/// decoded and PDFs have their text layer extracted; anything else yields a
/// bracketed placeholder the model can see.
pub fn extract_text(file: &UploadedFile) -> String {
    let name = file.name.to_lowercase();
    let ctype = file.content_type.to_lowercase();

    if ctype.starts_with("text/") || name.ends_with(".txt") || name.ends_with(".md") {
        return String::from_utf8_lossy(&file.bytes).into_owned();
    }
    if ctype.contains("pdf") || name.ends_with(".pdf") {
        return pdf_text(&file.bytes, &file.name);
    }

    format!("[unsupported content-type: {ctype} for {}]", file.name)
}

/// Text layer of a PDF, or a bracketed note naming `source` when the
/// document cannot be read.
pub fn pdf_text(bytes: &[u8], source: &str) -> String {
    // pdf-extract panics on some malformed documents.
    let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())
    }))
    .unwrap_or_else(|_| Err("malformed document".to_string()));

    match extracted {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!("PDF extraction failed for {source}: {e}");
            format!("[pdf extraction failed for {source}: {e}]")
        }
    }
}

/// Builds the `=== name ===` sections for every non-empty file of this turn.
pub fn files_context(files: &[UploadedFile]) -> String {
    let mut ctx = String::new();
    for file in files.iter().filter(|f| !f.bytes.is_empty()) {
        let text = extract_text(file);
        if !text.trim().is_empty() {
            ctx.push_str("\n\n=== ");
            ctx.push_str(&file.name);
            ctx.push_str(" ===\n");
            ctx.push_str(&text);
        }
    }
    ctx
}

/// One-page PDF whose only content is `text` in Courier.
#[cfg(test)]
pub(crate) fn sample_pdf(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
