//! Downloadable PDF report.
//!
//! Composition and rendering are split: `compose` turns session results into
//! an ordered list of [`ReportBlock`]s (pure, easy to test), `render_pdf`
//! lays those blocks out on US Letter pages with `printpdf`.
//!
//! Model text is escaped before it becomes markup, so only the `<b>` tags
//! produced here carry meaning. The renderer decodes entities for display.

use chrono::{DateTime, Local};
use image::imageops::FilterType;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Rgb,
};
use regex::Regex;
use std::io::BufWriter;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::{
    error::{LabError, LabResult},
    intake,
    models::UploadedDocument,
    profile::UserProfile,
};

pub const TITLE: &str = "LabAnalyzer - Comprehensive Lab Report Analysis";
pub const DISCLAIMER: &str = "MEDICAL DISCLAIMER: This analysis is for educational purposes only and should not replace professional medical advice. Always consult with a healthcare professional for proper medical interpretation and treatment decisions.";
pub const FOOTER: &str =
    "© 2025 LabAnalyzer - Medical Lab Report Analyzer | Powered by Gemini AI + Tavily";

pub const PROFILE_HEADING: &str = "User Profile:";
pub const IMAGE_HEADING: &str = "Lab Report Image:";
pub const ANALYSIS_HEADING: &str = "Lab Report Analysis:";
pub const RECOMMENDATION_HEADING: &str = "Personalized Recommendations:";

const PAGE_WIDTH_MM: f32 = 215.9;
const PAGE_HEIGHT_MM: f32 = 279.4;
const MARGIN_MM: f32 = 25.4;
const TEXT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
const IMAGE_WIDTH_MM: f32 = 4.0 * 25.4;
/// Larger scans are downsampled before embedding.
const MAX_EMBED_PX: u32 = 1200;
const PT_TO_MM: f32 = 0.3528;

static BOLD_MARKDOWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("Invalid regex"));

#[derive(Debug, Clone, PartialEq)]
pub enum ReportBlock {
    Title(String),
    Disclaimer(String),
    Timestamp(String),
    Heading(String),
    SubHeading(String),
    /// Escaped text; `<b>...</b>` marks bold runs
    Paragraph(String),
    Image {
        rgb: Vec<u8>,
        width: u32,
        height: u32,
    },
    Footer(String),
}

impl ReportBlock {
    /// Printed size of an image block: 4 inches wide, aspect preserved.
    pub fn display_size_mm(&self) -> Option<(f32, f32)> {
        match self {
            ReportBlock::Image { width, height, .. } if *width > 0 => {
                Some((IMAGE_WIDTH_MM, IMAGE_WIDTH_MM * *height as f32 / *width as f32))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportDocument {
    pub blocks: Vec<ReportBlock>,
    /// Sections that were dropped, e.g. an image that could not be decoded
    pub warnings: Vec<String>,
}

impl ReportDocument {
    pub fn has_heading(&self, heading: &str) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b, ReportBlock::Heading(h) if h == heading))
    }
}

pub fn compose(
    upload: Option<&UploadedDocument>,
    analysis: Option<&str>,
    recommendation: Option<&str>,
    profile: Option<&UserProfile>,
    generated_at: DateTime<Local>,
) -> ReportDocument {
    let mut report = ReportDocument::default();
    let blocks = &mut report.blocks;

    blocks.push(ReportBlock::Title(TITLE.to_string()));
    blocks.push(ReportBlock::Disclaimer(DISCLAIMER.to_string()));
    blocks.push(ReportBlock::Timestamp(format!(
        "Generated on: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    )));

    if let Some(profile) = profile.filter(|p| !p.is_empty()) {
        blocks.push(ReportBlock::Heading(PROFILE_HEADING.to_string()));
        blocks.extend(
            profile
                .to_blob()
                .lines()
                .map(|line| ReportBlock::Paragraph(escape_markup(line))),
        );
    }

    if let Some(doc) = upload {
        match image_block(doc) {
            Ok(block) => {
                blocks.push(ReportBlock::Heading(IMAGE_HEADING.to_string()));
                blocks.push(block);
            }
            Err(e) => {
                warn!(filename = %doc.filename, "Lab report image left out of the report: {}", e);
                report
                    .warnings
                    .push(format!("Lab report image could not be embedded: {e}"));
            }
        }
    }

    let blocks = &mut report.blocks;
    if let Some(text) = analysis {
        blocks.push(ReportBlock::Heading(ANALYSIS_HEADING.to_string()));
        blocks.extend(markdown_blocks(text));
    }
    if let Some(text) = recommendation {
        blocks.push(ReportBlock::Heading(RECOMMENDATION_HEADING.to_string()));
        blocks.extend(markdown_blocks(text));
    }

    blocks.push(ReportBlock::Footer(FOOTER.to_string()));
    report
}

fn image_block(doc: &UploadedDocument) -> LabResult<ReportBlock> {
    let mut image = intake::decode(doc)?;
    if image.width() > MAX_EMBED_PX {
        image = image.resize(MAX_EMBED_PX, u32::MAX, FilterType::Triangle);
    }
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(ReportBlock::Image {
        rgb: rgb.into_raw(),
        width,
        height,
    })
}

pub fn escape_markup(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Model output to blocks: `#` lines become sub-headings, every other
/// non-blank line a paragraph with `**bold**` turned into `<b>` runs.
pub fn markdown_blocks(text: &str) -> Vec<ReportBlock> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let escaped = escape_markup(line);
            if line.starts_with('#') {
                let heading = escaped.trim_start_matches('#').trim().replace("**", "");
                ReportBlock::SubHeading(heading)
            } else {
                ReportBlock::Paragraph(BOLD_MARKDOWN.replace_all(&escaped, "<b>$1</b>").into_owned())
            }
        })
        .collect()
}

/// Splits paragraph markup into `(text, bold)` runs with entities decoded.
pub fn markup_runs(markup: &str) -> Vec<(String, bool)> {
    let mut runs = Vec::new();
    let mut bold = false;
    let mut rest = markup;
    loop {
        let tag = if bold { "</b>" } else { "<b>" };
        match rest.find(tag) {
            Some(pos) => {
                if pos > 0 {
                    runs.push((decode_entities(&rest[..pos]), bold));
                }
                rest = &rest[pos + tag.len()..];
                bold = !bold;
            }
            None => {
                if !rest.is_empty() {
                    runs.push((decode_entities(rest), bold));
                }
                return runs;
            }
        }
    }
}

/// Maps text onto what the built-in Helvetica can show.
pub fn printable(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            '\u{2022}' | '\u{25CF}' => '*',
            '\u{00A0}' | '\t' => ' ',
            c if (' '..='~').contains(&c) || ('\u{00A1}'..='\u{00FF}').contains(&c) => c,
            _ => '?',
        })
        .collect()
}

pub fn report_filename(now: DateTime<Local>) -> String {
    format!("lab_analysis_report_{}.pdf", now.format("%Y%m%d_%H%M%S"))
}

/// PDF bytes plus the warnings of the composition that produced them.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub pdf: Vec<u8>,
    pub warnings: Vec<String>,
}

pub fn compose_pdf(
    upload: Option<&UploadedDocument>,
    analysis: Option<&str>,
    recommendation: Option<&str>,
    profile: Option<&UserProfile>,
    generated_at: DateTime<Local>,
) -> LabResult<RenderedReport> {
    let report = compose(upload, analysis, recommendation, profile, generated_at);
    let pdf = render_pdf(&report)?;
    info!(
        blocks = report.blocks.len(),
        warnings = report.warnings.len(),
        bytes = pdf.len(),
        "Report rendered"
    );
    Ok(RenderedReport {
        pdf,
        warnings: report.warnings,
    })
}

fn pdf_error(stage: &str, e: impl std::fmt::Display) -> LabError {
    LabError::CompositionFailed(format!("{stage}: {e}"))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
}

#[derive(Clone, Copy)]
struct Style {
    size: f32,
    bold: bool,
    italic: bool,
    color: (f32, f32, f32),
    space_after: f32,
}

const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);

impl Style {
    const fn plain(size: f32) -> Self {
        Self {
            size,
            bold: false,
            italic: false,
            color: BLACK,
            space_after: 1.5,
        }
    }

    fn line_height(&self) -> f32 {
        self.size * PT_TO_MM * 1.35
    }

    fn chars_per_line(&self) -> usize {
        let avg_char = self.size * PT_TO_MM * if self.bold { 0.55 } else { 0.5 };
        (TEXT_WIDTH_MM / avg_char) as usize
    }
}

fn style_for(block: &ReportBlock) -> Style {
    match block {
        ReportBlock::Title(_) => Style {
            bold: true,
            space_after: 4.0,
            ..Style::plain(16.0)
        },
        ReportBlock::Disclaimer(_) => Style {
            italic: true,
            color: (0.75, 0.1, 0.1),
            space_after: 3.0,
            ..Style::plain(9.0)
        },
        ReportBlock::Timestamp(_) => Style {
            space_after: 5.0,
            ..Style::plain(9.0)
        },
        ReportBlock::Heading(_) => Style {
            bold: true,
            color: (0.1, 0.3, 0.55),
            space_after: 2.5,
            ..Style::plain(13.0)
        },
        ReportBlock::SubHeading(_) => Style {
            bold: true,
            space_after: 1.5,
            ..Style::plain(11.0)
        },
        ReportBlock::Footer(_) => Style {
            color: (0.5, 0.5, 0.5),
            ..Style::plain(8.0)
        },
        ReportBlock::Paragraph(_) | ReportBlock::Image { .. } => Style::plain(10.0),
    }
}

/// Cursor over the pages of one document; starts a new page when a line or
/// image would cross the bottom margin.
struct PageWriter<'a> {
    doc: &'a PdfDocumentReference,
    fonts: Fonts,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl PageWriter<'_> {
    fn reserve(&mut self, height: f32) {
        if self.y - height < MARGIN_MM && self.y < PAGE_HEIGHT_MM - MARGIN_MM {
            let (page, layer) = self.doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", self.pages + 1),
            );
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = PAGE_HEIGHT_MM - MARGIN_MM;
            self.pages += 1;
        }
    }

    fn set_color(&self, (r, g, b): (f32, f32, f32)) {
        self.layer.set_fill_color(Color::Rgb(Rgb::new(r, g, b, None)));
    }

    fn font(&self, style: &Style, bold: bool) -> &IndirectFontRef {
        if bold || style.bold {
            &self.fonts.bold
        } else if style.italic {
            &self.fonts.italic
        } else {
            &self.fonts.regular
        }
    }

    fn write_runs(&mut self, runs: &[(String, bool)], style: Style) {
        self.set_color(style.color);
        for line in wrap_runs(runs, style.chars_per_line()) {
            self.reserve(style.line_height());
            self.y -= style.line_height();

            self.layer.begin_text_section();
            self.layer.set_text_cursor(Mm(MARGIN_MM), Mm(self.y));
            for (text, bold) in &line {
                let font = self.font(&style, *bold);
                self.layer.set_font(font, style.size);
                self.layer.write_text(printable(text), font);
            }
            self.layer.end_text_section();
        }
        self.y -= style.space_after;
        self.set_color(BLACK);
    }

    fn write_image(&mut self, block: &ReportBlock) -> LabResult<()> {
        let ReportBlock::Image { rgb, width, height } = block else {
            return Ok(());
        };
        let Some((_, mut height_mm)) = block.display_size_mm() else {
            return Ok(());
        };
        let mut dpi = *width as f32 / 4.0;
        let max_height = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;
        if height_mm > max_height {
            dpi *= height_mm / max_height;
            height_mm = max_height;
        }

        let buffer = printpdf::image_crate::RgbImage::from_raw(*width, *height, rgb.clone())
            .ok_or_else(|| pdf_error("image", "pixel buffer does not match dimensions"))?;
        let image =
            Image::from_dynamic_image(&printpdf::image_crate::DynamicImage::ImageRgb8(buffer));

        self.reserve(height_mm);
        self.y -= height_mm;
        image.add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(MARGIN_MM)),
                translate_y: Some(Mm(self.y)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );
        self.y -= 4.0;
        Ok(())
    }
}

pub fn render_pdf(report: &ReportDocument) -> LabResult<Vec<u8>> {
    let (doc, page1, layer1) =
        PdfDocument::new(TITLE, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Page 1");
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| pdf_error("font", e))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| pdf_error("font", e))?,
        italic: doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(|e| pdf_error("font", e))?,
    };

    let mut writer = PageWriter {
        layer: doc.get_page(page1).get_layer(layer1),
        doc: &doc,
        fonts,
        y: PAGE_HEIGHT_MM - MARGIN_MM,
        pages: 1,
    };

    for block in &report.blocks {
        let style = style_for(block);
        match block {
            ReportBlock::Image { .. } => writer.write_image(block)?,
            ReportBlock::Paragraph(markup) => writer.write_runs(&markup_runs(markup), style),
            ReportBlock::Heading(text) | ReportBlock::SubHeading(text) => {
                writer.y -= 2.0;
                writer.write_runs(&markup_runs(text), style)
            }
            ReportBlock::Footer(text) => {
                writer.y -= 6.0;
                writer.write_runs(&[(text.clone(), false)], style)
            }
            ReportBlock::Title(text)
            | ReportBlock::Disclaimer(text)
            | ReportBlock::Timestamp(text) => writer.write_runs(&[(text.clone(), false)], style),
        }
    }

    drop(writer);
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| pdf_error("save", e))?;
    buf.into_inner().map_err(|e| pdf_error("buffer", e))
}

type Word = Vec<(String, bool)>;

/// Greedy word wrap that keeps each word's bold runs; adjacent runs with the
/// same weight are merged per line.
/// Hard-splits a word wider than a whole line (long URLs, IDs) into
/// line-sized chunks, keeping each character's bold flag.
fn split_long_word(word: Word, max_chars: usize) -> Vec<Word> {
    let len: usize = word.iter().map(|(t, _)| t.chars().count()).sum();
    if max_chars == 0 || len <= max_chars {
        return vec![word];
    }
    let mut chunks: Vec<Word> = Vec::new();
    let mut chunk: Word = Vec::new();
    let mut chunk_len = 0;
    for (text, bold) in word {
        for c in text.chars() {
            if chunk_len == max_chars {
                chunks.push(std::mem::take(&mut chunk));
                chunk_len = 0;
            }
            match chunk.last_mut() {
                Some((last, last_bold)) if *last_bold == bold => last.push(c),
                _ => chunk.push((c.to_string(), bold)),
            }
            chunk_len += 1;
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

fn wrap_runs(runs: &[(String, bool)], max_chars: usize) -> Vec<Vec<(String, bool)>> {
    let mut words: Vec<Word> = Vec::new();
    let mut current: Word = Vec::new();
    for (text, bold) in runs {
        for (i, piece) in text.split(char::is_whitespace).enumerate() {
            if i > 0 && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if !piece.is_empty() {
                current.push((piece.to_string(), *bold));
            }
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    let words = words
        .into_iter()
        .flat_map(|word| split_long_word(word, max_chars));

    let mut lines: Vec<Vec<Word>> = Vec::new();
    let mut line: Vec<Word> = Vec::new();
    let mut line_len = 0;
    for word in words {
        let len: usize = word.iter().map(|(t, _)| t.chars().count()).sum();
        if !line.is_empty() && line_len + 1 + len > max_chars {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        line_len += if line.is_empty() { len } else { len + 1 };
        line.push(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }

    lines
        .into_iter()
        .map(|words| {
            let mut merged: Vec<(String, bool)> = Vec::new();
            for (i, word) in words.into_iter().enumerate() {
                for (j, (text, bold)) in word.into_iter().enumerate() {
                    let text = if i > 0 && j == 0 {
                        format!(" {text}")
                    } else {
                        text
                    };
                    match merged.last_mut() {
                        Some((last, last_bold)) if *last_bold == bold => last.push_str(&text),
                        _ => merged.push((text, bold)),
                    }
                }
            }
            merged
        })
        .collect()
}
