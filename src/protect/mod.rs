//! Document preparation: overlays every page with gate-controlled layers and
//! embeds the compiled gate as the open action.

pub mod action;
pub mod layers;
pub mod text;

use std::path::{Path, PathBuf};

use lopdf::Document;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::batch::create_unique_output;
use crate::config::ProtectOptions;
use crate::error::{Error, Result, StructureError};
use crate::gate::{ExpirationGate, OptionalContentGroup};
use crate::script::render_open_action_script;

use self::layers::{LayerKind, LayerSpec};

/// Summary of one protection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectReport {
    pub pages: usize,
    pub layers_added: usize,
    pub output: Option<PathBuf>,
}

/// Applies one set of [`ProtectOptions`] to documents.
#[derive(Debug, Clone)]
pub struct DocumentProtector {
    options: ProtectOptions,
    gate: ExpirationGate,
    script: String,
}

impl DocumentProtector {
    pub fn new(options: ProtectOptions) -> Result<Self> {
        options.validate()?;
        let gate = options.gate()?;
        let script = render_open_action_script(&gate);
        Ok(Self { options, gate, script })
    }

    pub fn options(&self) -> &ProtectOptions {
        &self.options
    }

    pub fn gate(&self) -> &ExpirationGate {
        &self.gate
    }

    /// The open-action script embedded into every protected document.
    pub fn script(&self) -> &str {
        &self.script
    }

    #[instrument(skip(self, doc))]
    pub fn protect_document(&self, doc: &mut Document) -> Result<ProtectReport> {
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(Error::AlreadyProtected("document is encrypted".into()));
        }

        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(StructureError::InvalidPageTree("document has no pages".into()).into());
        }
        info!("Protecting {} pages", pages.len());

        let with_expired = !self.options.expired_text.is_empty();
        let with_notice = !self.options.unsupported_text.is_empty();
        let fonts = if with_expired || with_notice {
            Some(text::install_fonts(doc))
        } else {
            None
        };

        let mut groups = Vec::new();
        for (number, page_id) in pages {
            let planned = layers::plan_page_layers(number, self.options.mask_layers, with_expired, with_notice);
            let media_box = layers::media_box(doc, page_id)?;
            let mut resources = layers::page_resources(doc, page_id)?;
            let mut overlay = String::new();

            for layer in &planned {
                let ocg = layers::create_ocg(doc, &layer.name);
                let xobject = self.build_layer_xobject(doc, layer, media_box, fonts.as_ref());

                layers::sub_dictionary(&mut resources, b"XObject")?.set(layer.xobject_name(), xobject);
                layers::sub_dictionary(&mut resources, b"Properties")?.set(layer.name.clone(), ocg);
                overlay.push_str(&layers::layer_operators(&layer.name, &layer.xobject_name()));
                groups.push(ocg);
            }

            doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", resources);
            layers::wrap_page_contents(doc, page_id, overlay.into_bytes())?;
            debug!("Page {}: {} layers", number, planned.len());
        }

        layers::register_ocgs(doc, &groups)?;
        action::install_open_action(doc, &self.script)?;

        Ok(ProtectReport {
            pages: doc.get_pages().len(),
            layers_added: groups.len(),
            output: None,
        })
    }

    fn build_layer_xobject(
        &self,
        doc: &mut Document,
        layer: &LayerSpec,
        media_box: [f64; 4],
        fonts: Option<&lopdf::Dictionary>,
    ) -> lopdf::ObjectId {
        let notice = match layer.kind {
            LayerKind::Mask | LayerKind::ExpiredMask => None,
            LayerKind::ExpiredText => Some(&self.options.expired_text),
            LayerKind::UnsupportedNotice => Some(&self.options.unsupported_text),
        };
        match (notice, fonts) {
            (Some(message), Some(fonts)) => {
                let resources = lopdf::dictionary! { "Font" => fonts.clone() };
                layers::create_form_xobject(doc, media_box, text::notice_content(message, media_box), Some(resources))
            }
            _ => layers::create_form_xobject(doc, media_box, text::cover_content(media_box), None),
        }
    }

    /// Protects a serialized document and returns the new bytes.
    pub fn protect_bytes(&self, input: &[u8]) -> Result<(Vec<u8>, ProtectReport)> {
        let mut doc = Document::load_mem(input)?;
        let report = self.protect_document(&mut doc)?;
        let mut buffer = Vec::with_capacity(input.len() + 4096);
        doc.save_to(&mut buffer)?;
        Ok((buffer, report))
    }

    /// Reads `input`, protects it on a blocking task and writes the result
    /// next to `output`, choosing a fresh name if `output` already exists.
    #[instrument(skip(self, input), fields(input = %input.display()))]
    pub async fn protect_file(&self, input: &Path, output: &Path) -> Result<ProtectReport> {
        let data = tokio::fs::read(input).await?;

        let protector = self.clone();
        let (bytes, mut report) = tokio::task::spawn_blocking(move || protector.protect_bytes(&data)).await??;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let (mut file, output) = create_unique_output(output).await?;
        if let Err(e) = write_all(&mut file, &bytes).await {
            drop(file);
            if let Err(cleanup) = tokio::fs::remove_file(&output).await {
                warn!("Could not remove partial output {}: {}", output.display(), cleanup);
            }
            return Err(e);
        }

        info!("Wrote {} ({} pages, {} layers)", output.display(), report.pages, report.layers_added);
        report.output = Some(output);
        Ok(report)
    }
}

async fn write_all(file: &mut tokio::fs::File, bytes: &[u8]) -> Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Layers a protected `page` carries, in their default (visible) state.
pub fn initial_layer_states(options: &ProtectOptions, page: u32) -> Vec<OptionalContentGroup> {
    layers::plan_page_layers(
        page,
        options.mask_layers,
        !options.expired_text.is_empty(),
        !options.unsupported_text.is_empty(),
    )
    .into_iter()
    .map(|layer| OptionalContentGroup::new(layer.name, true))
    .collect()
}
