//! CLI binary for svgdedup.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DedupConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use svgdedup::pipeline::flatten::hex_color;
use svgdedup::{
    dedup_pdf_file, dedup_svg_file, DecodedImage, DedupConfig, DedupError, DedupProgressCallback,
    DedupReport, FlattenAll, FlattenCandidate, FlattenDecider, FlattenDecision, Inkscape,
    NoFlatten, ProgressCallback, MATCH_THRESHOLD,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar and per-image log
/// lines using [indicatif]. The scan is sequential, so events always arrive
/// in document order.
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_scan_start` (called before any image is decoded).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_scan_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Parsing SVG…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
    }
}

impl DedupProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, total_images: usize) {
        // Switch from spinner-only style to full progress bar now that we
        // know the actual image count.
        self.activate_bar(total_images);
        if total_images > 0 {
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("Scanning {total_images} embedded images…"))
            ));
        }
    }

    fn on_image_scanned(&self, index: usize, total: usize, duplicate: bool) {
        if duplicate {
            self.bar.println(format!(
                "  {} image {:>3}/{:<3}  {}",
                green("✓"),
                index,
                total,
                dim("duplicate of an earlier image"),
            ));
        }
        self.bar.set_message(format!("image {index}"));
        self.bar.inc(1);
    }

    fn on_scan_complete(&self, kept: usize, clones: usize) {
        self.bar.finish_and_clear();

        if kept + clones == 0 {
            eprintln!("{} no embedded images found", cyan("◇"));
        } else if clones == 0 {
            eprintln!(
                "{} {} unique images, nothing to fold",
                green("✔"),
                bold(&kept.to_string())
            );
        } else {
            eprintln!(
                "{} {} of {} images are duplicates",
                green("✔"),
                bold(&clones.to_string()),
                kept + clones,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Deduplicate the images inside an SVG (writes figure-dedup.svg)
  svgdedup figure.svg

  # Choose the output path
  svgdedup figure.svg -o figure-small.svg

  # Full PDF round trip (requires Inkscape)
  svgdedup paper.pdf -o paper-small.pdf

  # Keep the rewritten intermediate SVG next to the PDF
  svgdedup paper.pdf --keep-svg paper-dedup.svg

  # Non-interactive: never ask, never flatten
  svgdedup --flatten never figure.svg

  # Flatten every kept image to its mean colour at half opacity
  svgdedup --flatten all --opacity 0.5 figure.svg

  # Machine-readable summary on stdout
  svgdedup --flatten never --json figure.svg

HOW MATCHING WORKS:
  Every <image> payload is decoded and compared against the images kept so
  far using a normalised sum-of-squared-differences template match: the
  smaller image slides over the larger one and the best alignment is scored
  between 0.0 (identical) and ~1.0 (unrelated). Scores below --threshold
  count as duplicates, so crops and re-encodes of the same picture fold
  together; greyscale and colour images are never compared to each other.
  Duplicates become <use> references to the kept copy, which must carry an
  id attribute.

ENVIRONMENT VARIABLES:
  SVGDEDUP_OUTPUT      Default output path
  SVGDEDUP_INKSCAPE    Path to the Inkscape executable
  SVGDEDUP_THRESHOLD   Override the duplicate-match threshold
  SVGDEDUP_FLATTEN     Default flatten policy (prompt, never, all)

SETUP:
  SVG inputs need nothing beyond this binary. PDF inputs are converted
  through Inkscape 1.x, found on PATH or via --inkscape:

    svgdedup paper.pdf --inkscape /usr/bin/inkscape
"#;

/// Deduplicate embedded raster images in SVG and PDF figures.
#[derive(Parser, Debug)]
#[command(
    name = "svgdedup",
    version,
    about = "Deduplicate embedded raster images in SVG and PDF figures",
    long_about = "Find near-duplicate raster images embedded in an SVG (or in a PDF, via an \
Inkscape round trip), keep one canonical copy of each and rewrite the rest as <use> \
references. Kept images can optionally be flattened to a plain rectangle of their mean \
colour, which shrinks figures that embed large but visually flat bitmaps.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input file: .svg or .pdf.
    input: PathBuf,

    /// Output path. Default: `<stem>-dedup.<ext>` next to the input.
    #[arg(short, long, env = "SVGDEDUP_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the rewritten intermediate SVG here (PDF inputs only).
    #[arg(long)]
    keep_svg: Option<PathBuf>,

    /// Path to the Inkscape executable.
    #[arg(
        long,
        env = "SVGDEDUP_INKSCAPE",
        long_help = "Path to the Inkscape executable used for PDF⇄SVG conversion.\n\
          Default: the first 'inkscape' found on PATH. Only consulted for .pdf inputs."
    )]
    inkscape: Option<PathBuf>,

    /// Duplicate-match threshold on the normalised difference score.
    #[arg(
        long,
        env = "SVGDEDUP_THRESHOLD",
        default_value_t = MATCH_THRESHOLD,
        long_help = "Score below which two images count as duplicates. 0.0 means only \
          pixel-perfect repeats; the default 1e-4 admits encoder rounding noise while \
          rejecting everything visually distinct."
    )]
    threshold: f32,

    /// Flatten policy for kept images.
    #[arg(long, env = "SVGDEDUP_FLATTEN", value_enum, default_value = "prompt")]
    flatten: FlattenMode,

    /// Opacity for flattened rectangles (0.0–1.0).
    #[arg(
        long,
        env = "SVGDEDUP_OPACITY",
        long_help = "Blend each flattened image's mean colour against white at this opacity \
          before writing the rectangle. 1.0 keeps the mean colour unchanged. With \
          --flatten prompt this also skips the per-image opacity question."
    )]
    opacity: Option<f64>,

    /// Replace existing output files instead of refusing to run.
    #[arg(long)]
    overwrite: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "SVGDEDUP_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "SVGDEDUP_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SVGDEDUP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SVGDEDUP_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
enum FlattenMode {
    /// Ask per kept image on the terminal.
    Prompt,
    /// Leave every kept image embedded.
    Never,
    /// Flatten every kept image without asking.
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve paths ────────────────────────────────────────────────────
    let input_kind = InputKind::of(&cli.input)?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input));

    if cli.keep_svg.is_some() && input_kind == InputKind::Svg && !cli.quiet {
        eprintln!(
            "{} --keep-svg only applies to PDF inputs; ignoring it",
            cyan("⚠")
        );
    }

    if cli.overwrite {
        remove_if_present(&output)?;
        if let Some(ref svg) = cli.keep_svg {
            remove_if_present(svg)?;
        }
    }

    // ── Build config ─────────────────────────────────────────────────────
    // The progress bar starts as a spinner (no image count yet);
    // `on_scan_start` resizes it to the correct total once the document
    // has been parsed. `show_progress` was already computed above.

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn DedupProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let mut decider = build_decider(&cli);

    // ── Run ──────────────────────────────────────────────────────────────
    let report = match input_kind {
        InputKind::Svg => dedup_svg_file(&cli.input, &output, &config, decider.as_mut())
            .context("SVG deduplication failed")?,
        InputKind::Pdf => {
            let converter = match cli.inkscape {
                Some(ref path) => Inkscape::new(path.clone()),
                None => Inkscape::discover(),
            }
            .context("Inkscape is required for PDF inputs")?;

            dedup_pdf_file(
                &cli.input,
                &output,
                cli.keep_svg.as_deref(),
                &config,
                &converter,
                decider.as_mut(),
            )
            .context("PDF deduplication failed")?
        }
    };

    // ── Summary ──────────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, &output);
    }

    Ok(())
}

/// What the input's extension says it is.
#[derive(Debug, Clone, Copy, PartialEq)]
enum InputKind {
    Svg,
    Pdf,
}

impl InputKind {
    fn of(path: &Path) -> Result<Self, DedupError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("svg") => Ok(Self::Svg),
            Some("pdf") => Ok(Self::Pdf),
            _ => Err(DedupError::UnsupportedInput {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Map CLI args to `DedupConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DedupConfig> {
    let mut builder = DedupConfig::builder().threshold(cli.threshold);
    if let Some(opacity) = cli.opacity {
        builder = builder.opacity(opacity);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

/// Map `--flatten` to a decider implementation.
fn build_decider(cli: &Cli) -> Box<dyn FlattenDecider> {
    match cli.flatten {
        FlattenMode::Never => Box::new(NoFlatten),
        FlattenMode::All => Box::new(FlattenAll { opacity: None }),
        FlattenMode::Prompt => {
            if io::stdin().is_terminal() {
                Box::new(ConsolePrompt {
                    ask_opacity: cli.opacity.is_none(),
                })
            } else {
                // Piped stdin cannot answer questions; keep everything
                // rather than blocking forever on a prompt.
                if !cli.quiet {
                    eprintln!(
                        "{} stdin is not a terminal; skipping flatten prompts",
                        cyan("⚠")
                    );
                }
                Box::new(NoFlatten)
            }
        }
    }
}

// ── Interactive flatten prompt ───────────────────────────────────────────────

/// Interactive flatten policy: previews each kept image on the terminal and
/// asks the operator what to do with it.
struct ConsolePrompt {
    /// False when --opacity fixed the blend, so the per-image opacity
    /// question is skipped.
    ask_opacity: bool,
}

impl FlattenDecider for ConsolePrompt {
    fn decide(
        &mut self,
        candidate: &FlattenCandidate,
        image: &DecodedImage,
    ) -> Result<FlattenDecision, DedupError> {
        preview(candidate, image);

        if !query_yes_no("Replace image with flat color?", false)? {
            return Ok(FlattenDecision::Keep);
        }
        let opacity = if self.ask_opacity && query_yes_no("Custom opacity?", true)? {
            Some(prompt_float("Input opacity [float]: ")?)
        } else {
            // None falls back to the configured opacity (1.0 unless
            // --opacity was given), which leaves the mean colour as-is.
            None
        };
        Ok(FlattenDecision::Flatten { opacity })
    }
}

/// Longest edge of the terminal preview, in character cells.
const PREVIEW_COLS: u32 = 48;
const PREVIEW_ROWS: u32 = 36; // pixel rows; two per character cell

/// Print a thumbnail of the image plus the numbers that matter for the
/// decision. Half-block rendering packs two pixel rows per text row: the
/// foreground colour paints the top pixel, the background the bottom one.
fn preview(candidate: &FlattenCandidate, image: &DecodedImage) {
    let label = match candidate.id {
        Some(ref id) => format!("Image {}/{} (id \"{id}\")", candidate.position, candidate.total),
        None => format!("Image {}/{}", candidate.position, candidate.total),
    };
    eprintln!();
    eprintln!(
        "{} {}  {}",
        cyan("◆"),
        bold(&label),
        dim(&format!("{}×{} px", candidate.width, candidate.height)),
    );

    let (w, h) = (image.width().max(1), image.height().max(1));
    let scale = f64::min(
        f64::from(PREVIEW_COLS) / f64::from(w),
        f64::from(PREVIEW_ROWS) / f64::from(h),
    )
    .min(1.0);
    let tw = ((f64::from(w) * scale).round() as u32).max(1);
    let th = ((f64::from(h) * scale).round() as u32).max(1);
    let thumb = image::imageops::thumbnail(image.rgba(), tw, th);

    let mut canvas = String::new();
    for y in (0..th).step_by(2) {
        canvas.push_str("  ");
        for x in 0..tw {
            let top = over_white(thumb.get_pixel(x, y));
            canvas.push_str(&format!("\x1b[38;2;{};{};{}m", top[0], top[1], top[2]));
            if y + 1 < th {
                let bottom = over_white(thumb.get_pixel(x, y + 1));
                canvas.push_str(&format!("\x1b[48;2;{};{};{}m", bottom[0], bottom[1], bottom[2]));
            }
            canvas.push('▀');
        }
        canvas.push_str("\x1b[0m\n");
    }
    eprint!("{canvas}");

    let m = candidate.mean_color;
    let swatch = format!(
        "\x1b[48;2;{};{};{}m  \x1b[0m",
        m[0].clamp(0.0, 255.0) as u8,
        m[1].clamp(0.0, 255.0) as u8,
        m[2].clamp(0.0, 255.0) as u8,
    );
    eprintln!(
        "  mean colour {} {}   stddev {}",
        swatch,
        bold(&hex_color(m)),
        dim(&format!(
            "({:.1}, {:.1}, {:.1})",
            candidate.color_stddev[0], candidate.color_stddev[1], candidate.color_stddev[2]
        )),
    );
}

/// Composite one preview pixel over a white page background, since the
/// terminal cannot show alpha.
fn over_white(px: &image::Rgba<u8>) -> [u8; 3] {
    let a = u32::from(px[3]);
    let blend = |c: u8| ((u32::from(c) * a + 255 * (255 - a)) / 255) as u8;
    [blend(px[0]), blend(px[1]), blend(px[2])]
}

/// Ask a yes/no question on the terminal. Empty input picks the default;
/// anything other than a yes/no spelling re-asks.
fn query_yes_no(question: &str, default_yes: bool) -> Result<bool, DedupError> {
    let suffix = if default_yes { " [Y/n] " } else { " [y/N] " };
    let map_io = |e: io::Error| DedupError::Prompt {
        detail: e.to_string(),
    };

    loop {
        eprint!("{}{}", bold(question), suffix);
        io::stderr().flush().map_err(map_io)?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line).map_err(map_io)? == 0 {
            return Err(DedupError::Prompt {
                detail: "stdin closed while waiting for an answer".into(),
            });
        }
        match line.trim().to_lowercase().as_str() {
            "" => return Ok(default_yes),
            "y" | "ye" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => eprintln!("Please respond with 'yes' or 'no'."),
        }
    }
}

/// Read one float from the terminal.
fn prompt_float(question: &str) -> Result<f64, DedupError> {
    let map_io = |e: io::Error| DedupError::Prompt {
        detail: e.to_string(),
    };

    eprint!("{}", bold(question));
    io::stderr().flush().map_err(map_io)?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line).map_err(map_io)? == 0 {
        return Err(DedupError::Prompt {
            detail: "stdin closed while waiting for a number".into(),
        });
    }
    line.trim().parse().map_err(|_| DedupError::Prompt {
        detail: format!("not a number: '{}'", line.trim()),
    })
}

// ── Output helpers ───────────────────────────────────────────────────────────

/// `figure.svg` → `figure-dedup.svg`, next to the input.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("svg");
    input.with_file_name(format!("{stem}-dedup.{ext}"))
}

fn remove_if_present(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing '{}'", path.display()))?;
    }
    Ok(())
}

/// Final summary line(s) on stderr (the callback already printed the
/// per-image log).
fn print_summary(report: &DedupReport, output: &Path) {
    let mark = if report.changed() {
        green("✔")
    } else {
        cyan("◇")
    };
    eprintln!(
        "{}  {} images  {} kept  {} folded  {} flattened  →  {}",
        mark,
        report.images_found,
        report.kept,
        report.clones,
        report.flattened,
        bold(&output.display().to_string()),
    );
    eprintln!(
        "   {}  {}",
        dim(&format!("{} of embedded payload saved", human_bytes(report.bytes_saved()))),
        dim(&format!(
            "{} ms scan, {} ms total",
            report.scan_duration_ms, report.total_duration_ms
        )),
    );
    if report.promotions > 0 {
        eprintln!(
            "   {}",
            dim(&format!(
                "{} kept image(s) upgraded to a larger duplicate",
                report.promotions
            )),
        );
    }
    if report.incomparable_pairs > 0 {
        eprintln!(
            "{} {} image pair(s) skipped: greyscale and colour data cannot be compared",
            cyan("⚠"),
            report.incomparable_pairs,
        );
    }
}

/// `10 B`, `4.2 KiB`, `1.3 MiB`.
fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
