//! Solution preferences collected from the user before a generation.
//!
//! The form is a leaf: it only holds local state and never touches the network.
//! Every selection defaults to its first option; the image stays empty until the
//! user supplies one.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::SolverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, ValueEnum)]
pub enum Language {
    #[default]
    #[strum(serialize = "Python")]
    #[value(name = "python", alias = "py")]
    Python,
    #[strum(serialize = "C++")]
    #[value(name = "cpp", alias = "c++")]
    Cpp,
    #[strum(serialize = "Java")]
    #[value(name = "java")]
    Java,
    #[strum(serialize = "JavaScript")]
    #[value(name = "javascript", alias = "js")]
    JavaScript,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, ValueEnum)]
pub enum SolutionStyle {
    #[default]
    #[strum(serialize = "Concise & efficient")]
    #[value(name = "concise")]
    ConciseEfficient,
    #[strum(serialize = "Detailed & step-by-step")]
    #[value(name = "detailed")]
    DetailedStepByStep,
    #[strum(serialize = "Beginner-friendly")]
    #[value(name = "beginner-friendly", alias = "beginner")]
    BeginnerFriendly,
    #[strum(serialize = "Best practices")]
    #[value(name = "best-practices")]
    BestPractices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, ValueEnum)]
pub enum ExplanationDepth {
    #[default]
    #[strum(serialize = "High-level summary")]
    #[value(name = "summary")]
    HighLevelSummary,
    #[strum(serialize = "Line-by-line walkthrough")]
    #[value(name = "line-by-line")]
    LineByLine,
    #[strum(serialize = "Concept-focused")]
    #[value(name = "concept")]
    ConceptFocused,
    #[strum(serialize = "With sample test cases")]
    #[value(name = "test-cases")]
    WithTestCases,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, ValueEnum)]
pub enum ExtraMaterial {
    #[default]
    #[strum(serialize = "No, just the explanation")]
    #[value(name = "none")]
    NoExtra,
    #[strum(serialize = "Relevant links")]
    #[value(name = "links")]
    RelevantLinks,
    #[strum(serialize = "Similar problems")]
    #[value(name = "similar")]
    SimilarProblems,
    #[strum(serialize = "Time & space complexity analysis")]
    #[value(name = "complexity")]
    Complexity,
}

/// Parse a selection either by its short CLI name (`cpp`, `summary`) or by its full
/// label (`C++`, `High-level summary`).
pub fn parse_choice<T>(input: &str) -> Option<T>
where
    T: ValueEnum + IntoEnumIterator + fmt::Display,
{
    let input = input.trim();
    if let Ok(choice) = <T as ValueEnum>::from_str(input, true) {
        return Some(choice);
    }
    T::iter().find(|choice| choice.to_string().eq_ignore_ascii_case(input))
}

/// The labels of every option, in the order they are offered.
pub fn choice_labels<T: IntoEnumIterator + fmt::Display>() -> Vec<String> {
    T::iter().map(|choice| choice.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub const ACCEPTED_EXTENSIONS: [&'static str; 3] = ["jpg", "jpeg", "png"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// A screenshot supplied by the user. The bytes are never modified.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedImage {
    file_name: String,
    format: ImageFormat,
    bytes: Vec<u8>,
}

impl fmt::Debug for UploadedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedImage")
            .field("file_name", &self.file_name)
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl UploadedImage {
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, SolverError> {
        let file_name = file_name.into();
        let format = Path::new(&file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| SolverError::UnsupportedImage(file_name.clone()))?;
        Ok(Self {
            file_name,
            format,
            bytes,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SolverError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        // reject by extension before reading anything
        if ImageFormat::from_extension(
            path.extension().and_then(|e| e.to_str()).unwrap_or_default(),
        )
        .is_none()
        {
            return Err(SolverError::UnsupportedImage(file_name));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(file_name, bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One snapshot of the form, consumed by a single generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Preferences {
    pub image: Option<UploadedImage>,
    pub language: Language,
    pub style: SolutionStyle,
    pub depth: ExplanationDepth,
    pub extra: ExtraMaterial,
}

impl Preferences {
    /// The image, if one was supplied and it carries any bytes.
    pub fn usable_image(&self) -> Option<&UploadedImage> {
        self.image.as_ref().filter(|image| !image.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreferenceForm {
    image: Option<UploadedImage>,
    image_path: Option<PathBuf>,
    language: Language,
    style: SolutionStyle,
    depth: ExplanationDepth,
    extra: ExtraMaterial,
}

impl PreferenceForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_image(&mut self, image: UploadedImage) {
        self.image = Some(image);
        self.image_path = None;
    }

    /// Load the image from disk and remember where it came from.
    pub fn select_image_path<P: AsRef<Path>>(&mut self, path: P) -> Result<(), SolverError> {
        let image = UploadedImage::open(&path)?;
        self.image = Some(image);
        self.image_path = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    pub fn clear_image(&mut self) {
        self.image = None;
        self.image_path = None;
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn set_style(&mut self, style: SolutionStyle) {
        self.style = style;
    }

    pub fn set_depth(&mut self, depth: ExplanationDepth) {
        self.depth = depth;
    }

    pub fn set_extra(&mut self, extra: ExtraMaterial) {
        self.extra = extra;
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    /// Snapshot the current selections.
    pub fn preferences(&self) -> Preferences {
        Preferences {
            image: self.image.clone(),
            language: self.language,
            style: self.style,
            depth: self.depth,
            extra: self.extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_defaults_to_first_option() {
        let prefs = PreferenceForm::new().preferences();
        assert_eq!(prefs.image, None);
        assert_eq!(prefs.language, Language::iter().next().unwrap());
        assert_eq!(prefs.style, SolutionStyle::iter().next().unwrap());
        assert_eq!(prefs.depth, ExplanationDepth::iter().next().unwrap());
        assert_eq!(prefs.extra, ExtraMaterial::iter().next().unwrap());
    }

    #[test]
    fn test_labels_match_offered_options() {
        assert_eq!(choice_labels::<Language>(), ["Python", "C++", "Java", "JavaScript"]);
        assert_eq!(
            choice_labels::<SolutionStyle>(),
            ["Concise & efficient", "Detailed & step-by-step", "Beginner-friendly", "Best practices"]
        );
        assert_eq!(
            choice_labels::<ExplanationDepth>(),
            ["High-level summary", "Line-by-line walkthrough", "Concept-focused", "With sample test cases"]
        );
        assert_eq!(
            choice_labels::<ExtraMaterial>(),
            ["No, just the explanation", "Relevant links", "Similar problems", "Time & space complexity analysis"]
        );
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice::<Language>("cpp"), Some(Language::Cpp));
        assert_eq!(parse_choice::<Language>("C++"), Some(Language::Cpp));
        assert_eq!(parse_choice::<Language>("JS"), Some(Language::JavaScript));
        assert_eq!(
            parse_choice::<SolutionStyle>("Beginner-friendly"),
            Some(SolutionStyle::BeginnerFriendly)
        );
        assert_eq!(
            parse_choice::<ExtraMaterial>(" time & space complexity analysis "),
            Some(ExtraMaterial::Complexity)
        );
        assert_eq!(parse_choice::<ExplanationDepth>("verbose"), None);
    }

    #[test]
    fn test_image_extension_filter() {
        let png = UploadedImage::from_bytes("sample.png", vec![1, 2, 3]).unwrap();
        assert_eq!(png.format(), ImageFormat::Png);
        assert_eq!(png.format().mime(), "image/png");
        let jpeg = UploadedImage::from_bytes("shot.JPEG", vec![1]).unwrap();
        assert_eq!(jpeg.format(), ImageFormat::Jpeg);

        let err = UploadedImage::from_bytes("problem.gif", vec![1]).unwrap_err();
        assert!(matches!(err, SolverError::UnsupportedImage(name) if name == "problem.gif"));
        assert!(UploadedImage::from_bytes("no_extension", vec![1]).is_err());
    }

    #[test]
    fn test_open_image_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        let bytes = vec![0x89, b'P', b'N', b'G', 0, 255];
        std::fs::write(&path, &bytes).unwrap();

        let mut form = PreferenceForm::new();
        form.select_image_path(&path).unwrap();
        let image = form.image().unwrap();
        assert_eq!(image.file_name(), "sample.png");
        assert_eq!(image.bytes(), bytes.as_slice());
        assert_eq!(form.image_path(), Some(path.as_path()));

        form.clear_image();
        assert!(form.preferences().image.is_none());
    }

    #[test]
    fn test_empty_image_is_not_usable() {
        let mut form = PreferenceForm::new();
        form.select_image(UploadedImage::from_bytes("empty.png", Vec::new()).unwrap());
        let prefs = form.preferences();
        assert!(prefs.image.is_some());
        assert!(prefs.usable_image().is_none());
    }

    #[test]
    fn test_snapshot_reflects_current_state() {
        let mut form = PreferenceForm::new();
        let before = form.preferences();
        form.set_language(Language::Java);
        form.set_style(SolutionStyle::BestPractices);
        form.set_depth(ExplanationDepth::WithTestCases);
        form.set_extra(ExtraMaterial::SimilarProblems);
        let after = form.preferences();
        assert_eq!(before.language, Language::Python);
        assert_eq!(after.language, Language::Java);
        assert_eq!(after.style, SolutionStyle::BestPractices);
        assert_eq!(after.depth, ExplanationDepth::WithTestCases);
        assert_eq!(after.extra, ExtraMaterial::SimilarProblems);
    }
}
