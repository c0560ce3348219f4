//! Document → PDF conversion through external tools.
//!
//! Each converter is tried in order until one leaves a non-empty PDF next to
//! where the chain expects it. Every attempt runs under the chain's timeout;
//! a timed-out child process is killed.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{ConvertError, PipelineError};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Where a converter must write the PDF for `input`: `out_dir/<stem>.pdf`.
pub fn expected_pdf_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".pdf");
    out_dir.join(name)
}

/// One conversion strategy.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name for logs and error reports.
    fn name(&self) -> &str;

    /// Convert `input` into [`expected_pdf_path`]`(input, out_dir)`.
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<(), ConvertError>;
}

/// Run `program` with `args`, capturing output. Non-zero exit is an error
/// carrying stderr.
async fn run_process(program: &str, args: &[&OsStr]) -> Result<(), ConvertError> {
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ConvertError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ConvertError::Failed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Microsoft Word driven over COM from PowerShell. Windows only.
#[derive(Debug, Clone, Default)]
pub struct WordAutomation;

/// `wdFormatPDF` in Word's SaveAs file format enumeration.
const WD_FORMAT_PDF: u32 = 17;

impl WordAutomation {
    fn script(input: &Path, output: &Path) -> String {
        let quote = |p: &Path| p.display().to_string().replace('\'', "''");
        format!(
            "$ErrorActionPreference = 'Stop'; \
             $word = New-Object -ComObject Word.Application; \
             $word.Visible = $false; \
             try {{ \
               $doc = $word.Documents.Open('{input}', $false, $true); \
               $doc.SaveAs([ref]'{output}', [ref]{WD_FORMAT_PDF}); \
               $doc.Close($false) \
             }} finally {{ $word.Quit() }}",
            input = quote(input),
            output = quote(output),
        )
    }
}

#[async_trait]
impl Converter for WordAutomation {
    fn name(&self) -> &str {
        "word"
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        let input = std::path::absolute(input).unwrap_or_else(|_| input.to_path_buf());
        let output = std::path::absolute(expected_pdf_path(&input, out_dir))
            .unwrap_or_else(|_| expected_pdf_path(&input, out_dir));
        let script = Self::script(&input, &output);
        run_process(
            "powershell",
            &[
                OsStr::new("-NoProfile"),
                OsStr::new("-NonInteractive"),
                OsStr::new("-ExecutionPolicy"),
                OsStr::new("Bypass"),
                OsStr::new("-Command"),
                OsStr::new(&script),
            ],
        )
        .await
    }
}

/// LibreOffice in headless mode.
#[derive(Debug, Clone)]
pub struct LibreOffice {
    program: String,
}

impl LibreOffice {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `soffice` from the standard install location on Windows, otherwise
    /// from `PATH`.
    pub fn detect() -> Self {
        if cfg!(windows) {
            let installed = Path::new(r"C:\Program Files\LibreOffice\program\soffice.exe");
            if installed.exists() {
                return Self::new(installed.display().to_string());
            }
        }
        Self::new("soffice")
    }
}

#[async_trait]
impl Converter for LibreOffice {
    fn name(&self) -> &str {
        "libreoffice"
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        run_process(
            &self.program,
            &[
                OsStr::new("--headless"),
                OsStr::new("--convert-to"),
                OsStr::new("pdf"),
                input.as_os_str(),
                OsStr::new("--outdir"),
                out_dir.as_os_str(),
            ],
        )
        .await
    }
}

/// Pandoc, used as the last generic fallback.
#[derive(Debug, Clone, Default)]
pub struct Pandoc;

#[async_trait]
impl Converter for Pandoc {
    fn name(&self) -> &str {
        "pandoc"
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<(), ConvertError> {
        let output = expected_pdf_path(input, out_dir);
        run_process(
            "pandoc",
            &[input.as_os_str(), OsStr::new("-o"), output.as_os_str()],
        )
        .await
    }
}

/// Ordered fallback over several converters.
pub struct ConverterChain {
    converters: Vec<Arc<dyn Converter>>,
    timeout: Duration,
}

impl ConverterChain {
    pub fn new(converters: Vec<Arc<dyn Converter>>, timeout: Duration) -> Self {
        Self {
            converters,
            timeout,
        }
    }

    /// The default chain for the current OS.
    pub fn for_host(timeout: Duration) -> Self {
        let mut converters: Vec<Arc<dyn Converter>> = Vec::new();
        if cfg!(windows) {
            converters.push(Arc::new(WordAutomation));
        }
        converters.push(Arc::new(LibreOffice::detect()));
        converters.push(Arc::new(Pandoc));
        Self::new(converters, timeout)
    }

    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    /// Convert `input` into `out_dir`, returning the PDF path.
    pub async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
        let expected = expected_pdf_path(input, out_dir);
        let mut attempts = Vec::new();

        for converter in &self.converters {
            let name = converter.name();
            info!(converter = name, input = %input.display(), "Converting to PDF");

            let outcome = match tokio::time::timeout(self.timeout, converter.convert(input, out_dir))
                .await
            {
                Ok(Ok(())) => check_output(&expected).await,
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ConvertError::Timeout(self.timeout)),
            };

            match outcome {
                Ok(()) => {
                    info!(converter = name, output = %expected.display(), "PDF produced");
                    return Ok(expected);
                }
                Err(e) => {
                    warn!(converter = name, error = %e, "Converter failed");
                    let _ = tokio::fs::remove_file(&expected).await;
                    attempts.push(format!("{name}: {e}"));
                }
            }
        }

        Err(PipelineError::ConversionFailed { attempts })
    }
}

async fn check_output(expected: &Path) -> Result<(), ConvertError> {
    match tokio::fs::metadata(expected).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(ConvertError::NoOutput(expected.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes `contents` to the expected path, or fails.
    struct Fake {
        name: &'static str,
        contents: Option<&'static [u8]>,
        delay: Duration,
    }

    #[async_trait]
    impl Converter for Fake {
        fn name(&self) -> &str {
            self.name
        }

        async fn convert(&self, input: &Path, out_dir: &Path) -> Result<(), ConvertError> {
            tokio::time::sleep(self.delay).await;
            match self.contents {
                Some(bytes) => {
                    tokio::fs::write(expected_pdf_path(input, out_dir), bytes).await.unwrap();
                    Ok(())
                }
                None => Err(ConvertError::Failed {
                    program: self.name.to_string(),
                    code: Some(1),
                    stderr: "boom".into(),
                }),
            }
        }
    }

    fn fake(name: &'static str, contents: Option<&'static [u8]>) -> Arc<dyn Converter> {
        Arc::new(Fake {
            name,
            contents,
            delay: Duration::ZERO,
        })
    }

    #[test]
    fn expected_path_swaps_extension() {
        assert_eq!(
            expected_pdf_path(Path::new("/s/abc.docx"), Path::new("/out")),
            PathBuf::from("/out/abc.pdf")
        );
    }

    #[test]
    fn word_script_quotes_paths() {
        let script = WordAutomation::script(Path::new("C:/a'b.docx"), Path::new("C:/a'b.pdf"));
        assert!(script.contains("'C:/a''b.docx'"));
        assert!(script.contains("[ref]17"));
    }

    #[tokio::test]
    async fn falls_back_to_next_converter() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("r.docx");
        let chain = ConverterChain::new(
            vec![fake("first", None), fake("second", Some(b"%PDF"))],
            Duration::from_secs(5),
        );

        let pdf = chain.convert(&input, dir.path()).await.unwrap();
        assert_eq!(pdf, dir.path().join("r.pdf"));
        assert_eq!(tokio::fs::read(&pdf).await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn empty_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("r.docx");
        let chain = ConverterChain::new(vec![fake("empty", Some(b""))], Duration::from_secs(5));

        let err = chain.convert(&input, dir.path()).await.unwrap_err();
        let PipelineError::ConversionFailed { attempts } = err else {
            panic!("expected conversion failure");
        };
        assert_eq!(attempts.len(), 1);
        assert!(attempts[0].starts_with("empty: No output"));
        assert!(!dir.path().join("r.pdf").exists());
    }

    #[tokio::test]
    async fn all_failures_are_reported_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let chain = ConverterChain::new(
            vec![fake("a", None), fake("b", None)],
            Duration::from_secs(5),
        );
        let err = chain
            .convert(&dir.path().join("r.docx"), dir.path())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a: a exited"));
        assert!(message.contains("; b: b exited"));
    }

    #[tokio::test]
    async fn slow_converter_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let slow: Arc<dyn Converter> = Arc::new(Fake {
            name: "slow",
            contents: Some(b"%PDF"),
            delay: Duration::from_secs(10),
        });
        let chain = ConverterChain::new(
            vec![slow, fake("fast", Some(b"%PDF"))],
            Duration::from_millis(50),
        );

        let pdf = chain.convert(&dir.path().join("r.docx"), dir.path()).await.unwrap();
        assert!(pdf.exists());
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = run_process("report-bot-no-such-program", &[]).await.unwrap_err();
        assert!(matches!(err, ConvertError::Spawn { .. }));
    }

    #[test]
    fn host_chain_ends_with_pandoc() {
        let chain = ConverterChain::for_host(DEFAULT_TIMEOUT);
        let names = chain.names();
        assert_eq!(names.last(), Some(&"pandoc"));
        assert!(names.contains(&"libreoffice"));
        assert_eq!(names.contains(&"word"), cfg!(windows));
    }
}
