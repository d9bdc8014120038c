//! Edit dispatcher
//!
//! Walks an [`EditRequest`] page by page and hands each edit to its
//! renderer. A bad page or a bad edit is logged, recorded in the
//! [`ApplyReport`] and skipped. Only failing to open or save the document
//! fails the whole call.

use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{Document, ObjectId};
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::config::EditorConfig;
use crate::error::EditError;
use crate::fonts::{FontResolver, SystemFontResolver};
use crate::geometry::PageGeometry;
use crate::render::{render_edit, PageCanvas, RenderSession};
use crate::request::{AssetMap, EditRequest, EditSlot};

/// An edit (or a whole page of edits) that was not applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEdit {
    /// Page key as sent
    pub page: String,
    /// Position in the page's list, `None` when the whole page was skipped
    pub edit: Option<usize>,
    /// Edit type as sent, if known
    pub kind: Option<String>,
    #[serde(serialize_with = "as_display")]
    pub error: EditError,
}

fn as_display<S: Serializer>(error: &EditError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Outcome of one apply call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyReport {
    pub page_count: usize,
    pub applied: usize,
    pub skipped: Vec<SkippedEdit>,
}

impl ApplyReport {
    fn skip(
        &mut self,
        page: impl ToString,
        edit: Option<usize>,
        kind: Option<String>,
        error: EditError,
    ) {
        self.skipped.push(SkippedEdit {
            page: page.to_string(),
            edit,
            kind,
            error,
        });
    }
}

/// Applies edit requests to documents
///
/// Holds configuration only, so one compositor can serve concurrent
/// requests on different documents.
#[derive(Debug, Clone)]
pub struct Compositor<R = SystemFontResolver> {
    resolver: R,
    compress: bool,
}

impl Default for Compositor<SystemFontResolver> {
    fn default() -> Self {
        Self::new(SystemFontResolver::default())
    }
}

impl Compositor<SystemFontResolver> {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.font_resolver()).with_compression(config.output.compress)
    }
}

impl<R: FontResolver> Compositor<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            compress: true,
        }
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Apply every edit in `request` to `doc` in place.
    pub fn apply(
        &self,
        doc: &mut Document,
        request: &EditRequest,
        assets: &AssetMap,
    ) -> ApplyReport {
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let page_count = pages.len();
        let mut report = ApplyReport {
            page_count,
            ..ApplyReport::default()
        };
        let mut session = RenderSession::new(&self.resolver, assets);

        for key in &request.invalid_keys {
            warn!(page = %key, "page key is not an integer, skipping page");
            let error = EditError::InvalidPageIndex {
                index: key.clone(),
                page_count,
            };
            report.skip(key, None, None, error);
        }

        for (&index, slots) in &request.pages {
            let Some(&page_id) = usize::try_from(index).ok().and_then(|i| pages.get(i)) else {
                warn!(
                    page = index,
                    page_count,
                    edits = slots.len(),
                    "page out of range, skipping page"
                );
                let error = EditError::InvalidPageIndex {
                    index: index.to_string(),
                    page_count,
                };
                report.skip(index, None, None, error);
                continue;
            };

            let geometry = match PageGeometry::read(doc, page_id) {
                Ok(geometry) => geometry,
                Err(error) => {
                    warn!(page = index, %error, "cannot read page geometry, skipping page");
                    report.skip(index, None, None, error);
                    continue;
                }
            };

            let mut canvas = PageCanvas::new(page_id, geometry, request.units);
            let mut drawn = Vec::new();
            for (position, slot) in slots.iter().enumerate() {
                match slot {
                    EditSlot::Rejected { kind, error } => {
                        warn!(page = index, edit = position, kind = ?kind, %error, "skipping edit");
                        report.skip(index, Some(position), kind.clone(), error.clone());
                    }
                    EditSlot::Ready(edit) => {
                        let kind = edit.kind.name();
                        match render_edit(doc, &mut session, &mut canvas, edit) {
                            Ok(()) => {
                                debug!(page = index, edit = position, kind, "rendered edit");
                                drawn.push((position, kind));
                            }
                            Err(error) => {
                                warn!(page = index, edit = position, kind, %error, "skipping edit");
                                report.skip(index, Some(position), Some(kind.to_string()), error);
                            }
                        }
                    }
                }
            }

            if canvas.is_empty() {
                continue;
            }
            match canvas.commit(doc) {
                Ok(()) => report.applied += drawn.len(),
                Err(error) => {
                    warn!(page = index, %error, "cannot write page overlay");
                    for (position, kind) in drawn {
                        report.skip(index, Some(position), Some(kind.to_string()), error.clone());
                    }
                }
            }
        }

        session.finish(doc);
        info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            page_count,
            "edits applied"
        );
        report
    }

    /// Bytes in, bytes out.
    pub fn apply_to_bytes(
        &self,
        pdf_bytes: &[u8],
        request: &EditRequest,
        assets: &AssetMap,
    ) -> Result<(Vec<u8>, ApplyReport), EditError> {
        let mut doc = Document::load_mem(pdf_bytes).map_err(|e| EditError::Open {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        let report = self.apply(&mut doc, request, assets);
        if self.compress {
            doc.compress();
        }

        let mut output = Vec::new();
        doc.save_to(&mut output).map_err(|e| EditError::Save {
            path: "<memory>".into(),
            reason: e.to_string(),
        })?;
        Ok((output, report))
    }

    /// Read `source`, apply the edits and write the result to `output`.
    ///
    /// The result is written to a temporary sibling first and renamed into
    /// place, so `output` is either the complete document or untouched.
    #[instrument(skip_all, fields(source = %source.display(), output = %output.display()))]
    pub fn apply_file(
        &self,
        source: &Path,
        output: &Path,
        request: &EditRequest,
        assets: &AssetMap,
    ) -> Result<ApplyReport, EditError> {
        if same_file(source, output) {
            return Err(EditError::Save {
                path: output.display().to_string(),
                reason: "output would overwrite the source document".into(),
            });
        }

        let mut doc = Document::load(source).map_err(|e| EditError::Open {
            path: source.display().to_string(),
            reason: e.to_string(),
        })?;
        let report = self.apply(&mut doc, request, assets);
        if self.compress {
            doc.compress();
        }
        save_atomically(&mut doc, output)?;
        Ok(report)
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".into());
    output.with_file_name(format!(".{name}.partial"))
}

fn save_atomically(doc: &mut Document, output: &Path) -> Result<(), EditError> {
    let save_error = |reason: String| EditError::Save {
        path: output.display().to_string(),
        reason,
    };
    let partial = partial_path(output);

    if let Err(e) = doc.save(&partial) {
        let _ = fs::remove_file(&partial);
        return Err(save_error(e.to_string()));
    }
    fs::rename(&partial, output).map_err(|e| {
        let _ = fs::remove_file(&partial);
        save_error(e.to_string())
    })
}

/// Whether two paths name the same file, including an output that does
/// not exist yet.
fn same_file(a: &Path, b: &Path) -> bool {
    fn canonical(path: &Path) -> Option<PathBuf> {
        if let Ok(path) = path.canonicalize() {
            return Some(path);
        }
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        Some(parent.canonicalize().ok()?.join(path.file_name()?))
    }
    a == b || matches!((canonical(a), canonical(b)), (Some(x), Some(y)) if x == y)
}

/// Apply `request` to the PDF at `source` and write the result to `output`.
///
/// Pages and edits that cannot be applied are logged and skipped. Returns
/// the output path.
pub fn apply_edits(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    request: &EditRequest,
    assets: &AssetMap,
) -> Result<PathBuf, EditError> {
    let output = output.as_ref();
    Compositor::default().apply_file(source.as_ref(), output, request, assets)?;
    Ok(output.to_path_buf())
}

/// In-memory variant of [`apply_edits`].
pub fn apply_edits_to_bytes(
    pdf_bytes: &[u8],
    request: &EditRequest,
    assets: &AssetMap,
) -> Result<Vec<u8>, EditError> {
    Compositor::default()
        .apply_to_bytes(pdf_bytes, request, assets)
        .map(|(bytes, _)| bytes)
}
