//! Artifact pipeline: turns a finished report into stored files.
//!
//! Order of work for one report:
//! 1. Chart (best-effort, only when none was rendered during the interview)
//! 2. Template fill → `Reporte_<group>.docx`, indexed
//! 3. PDF conversion through the converter chain, indexed with the document
//!    as its parent
//!
//! Nothing is indexed for a step that failed.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::conversation::ReportData;
use crate::error::PipelineError;
use crate::pipeline::chart::{ChartRenderer, ChartSpec};
use crate::pipeline::convert::ConverterChain;
use crate::pipeline::docx::{fill_template, report_fields, report_images};
use crate::store::{FileIndex, FileRecord};

pub const REPORT_TAG: &str = "Reporte";
pub const CHART_TAG: &str = "Grafica";
pub const PHOTO_TAG: &str = "Montaje";

/// Everything one generation run stored.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub document: FileRecord,
    pub pdf: FileRecord,
    /// Chart rendered during this run, if any.
    pub chart: Option<FileRecord>,
}

pub struct ArtifactPipeline {
    template_path: PathBuf,
    files: Arc<FileIndex>,
    chart: Arc<dyn ChartRenderer>,
    converters: ConverterChain,
}

impl ArtifactPipeline {
    pub fn new(
        template_path: impl Into<PathBuf>,
        files: Arc<FileIndex>,
        chart: Arc<dyn ChartRenderer>,
        converters: ConverterChain,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            files,
            chart,
            converters,
        }
    }

    pub fn files(&self) -> &Arc<FileIndex> {
        &self.files
    }

    /// Render and index the results chart. `Ok(None)` when the data has
    /// nothing to plot.
    pub async fn render_chart(&self, data: &ReportData) -> Result<Option<FileRecord>, PipelineError> {
        let Some(spec) = ChartSpec::from_report(data) else {
            return Ok(None);
        };

        let name = format!("Grafica_{}.png", file_safe(&data.group));
        let dest = self.files.allocate(&name);

        let renderer = Arc::clone(&self.chart);
        let target = dest.clone();
        let rendered = tokio::task::spawn_blocking(move || renderer.render(&spec, &target))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;

        if let Err(e) = rendered {
            let _ = tokio::fs::remove_file(&dest).await;
            return Err(e.into());
        }

        let record = self.files.register(&dest, &name, CHART_TAG, None).await?;
        Ok(Some(record))
    }

    /// Produce and index the report document and its PDF.
    pub async fn generate(&self, data: &ReportData) -> Result<GeneratedReport, PipelineError> {
        let mut data = data.clone();
        info!(group = %data.group, title = %data.title, "Generating report");

        let mut chart = None;
        if data.chart_path.is_none() {
            match self.render_chart(&data).await {
                Ok(Some(record)) => {
                    data.chart_path = Some(record.storage_path.clone());
                    chart = Some(record);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Chart failed, continuing without it"),
            }
        }

        if !tokio::fs::try_exists(&self.template_path).await.unwrap_or(false) {
            error!(path = %self.template_path.display(), "Template not found");
            return Err(PipelineError::TemplateMissing(self.template_path.clone()));
        }

        let doc_name = format!("Reporte_{}.docx", file_safe(&data.group));
        let doc_path = self.files.allocate(&doc_name);

        let template = self.template_path.clone();
        let dest = doc_path.clone();
        let fields = report_fields(&data);
        let images = report_images(&data);
        let filled = tokio::task::spawn_blocking(move || {
            fill_template(&template, &dest, &fields, &images)
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?;

        let summary = match filled {
            Ok(summary) => summary,
            Err(e) => {
                let _ = tokio::fs::remove_file(&doc_path).await;
                error!(error = %e, "Template fill failed");
                return Err(e.into());
            }
        };
        info!(
            fields = summary.fields_replaced,
            images = summary.images_embedded,
            "Template filled"
        );

        let document = self
            .files
            .register(&doc_path, &doc_name, REPORT_TAG, None)
            .await?;

        let pdf_path = match self.converters.convert(&doc_path, self.files.root()).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, document = %document.id, "PDF conversion failed");
                return Err(e);
            }
        };
        let pdf_name = format!("Reporte_{}.pdf", file_safe(&data.group));
        let pdf = self
            .files
            .register(&pdf_path, &pdf_name, REPORT_TAG, Some(document.id))
            .await?;

        Ok(GeneratedReport {
            document,
            pdf,
            chart,
        })
    }
}

/// `group` reduced to characters safe in a file name.
fn file_safe(group: &str) -> String {
    let cleaned: String = group
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "SinGrupo".to_string()
    } else {
        cleaned
    }
}
