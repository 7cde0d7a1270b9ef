//! Filter graph composition.
//!
//! [`compose`] turns a [`FeatureSet`] into a `-filter_complex` description.
//! Stages are planned up front (layout, then title if wanted, then subtitle
//! burn if wanted) and folded over so that each stage reads the previous
//! stage's output. The terminal stream is whatever the last included stage
//! produced, so no stage can reference a stream that was never created.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use vshorts_models::{
    CutList, FeatureSet, FragmentSpec, LayoutMode, SubtitleTrack, TextRole, TextStyle,
    TitleOverlay, OUTPUT_FPS, TEXT_BORDER_WIDTH,
};

use crate::error::{MediaError, MediaResult};

/// Font used when neither the job nor the worker configuration names one.
pub const FALLBACK_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

const BACKGROUND_BLUR_SIGMA: u32 = 20;

/// A named stream in the filter graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamNode(String);

impl StreamNode {
    /// Name of the source video pad.
    pub const SOURCE: &'static str = "0:v";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn source() -> Self {
        Self::new(Self::SOURCE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Input pads (`0:v`, `1:a`, ...) come from the command line, not from a
    /// stage.
    pub fn is_input_pad(&self) -> bool {
        self.0.contains(':')
    }

    /// The bracketed form used in the graph text and with `-map`.
    pub fn label(&self) -> String {
        format!("[{}]", self.0)
    }
}

impl fmt::Display for StreamNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// One `[in]f1,f2[out]` segment of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    pub inputs: Vec<StreamNode>,
    pub filters: Vec<String>,
    pub outputs: Vec<StreamNode>,
}

impl FilterChain {
    fn new(inputs: &[&StreamNode], filters: Vec<String>, outputs: &[&StreamNode]) -> Self {
        Self {
            inputs: inputs.iter().map(|n| (*n).clone()).collect(),
            filters,
            outputs: outputs.iter().map(|n| (*n).clone()).collect(),
        }
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{input}")?;
        }
        write!(f, "{}", self.filters.join(","))?;
        for output in &self.outputs {
            write!(f, "{output}")?;
        }
        Ok(())
    }
}

/// Which part of the composition a stage implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Layout,
    Title,
    Subtitles,
}

impl StageKind {
    /// Name of the stream this stage produces.
    pub fn output_name(&self) -> &'static str {
        match self {
            StageKind::Layout => "layout",
            StageKind::Title => "titled",
            StageKind::Subtitles => "output",
        }
    }
}

/// A stage with its declared input, output and filter chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    pub input: StreamNode,
    pub output: StreamNode,
    pub chains: Vec<FilterChain>,
}

/// Frame size and font defaults for one composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionContext {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub title_font: String,
    pub subtitle_font: String,
}

impl CompositionContext {
    pub fn for_features(features: &FeatureSet) -> Self {
        let (width, height) = features.quality.dimensions();
        Self {
            width,
            height,
            fps: OUTPUT_FPS,
            title_font: FALLBACK_FONT.to_string(),
            subtitle_font: FALLBACK_FONT.to_string(),
        }
    }

    pub fn with_fonts(mut self, title_font: impl Into<String>, subtitle_font: impl Into<String>) -> Self {
        self.title_font = title_font.into();
        self.subtitle_font = subtitle_font.into();
        self
    }
}

/// Escape a value for the option level of a filter argument.
fn escape_option(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '\'' | ':' => {
                out.push('\\');
                out.push(c);
            }
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an already option-escaped value for the graph level.
fn escape_graph(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape free text or a file path for use as a filter option value inside
/// `-filter_complex`.
pub fn escape_filter_value(value: &str) -> String {
    escape_graph(&escape_option(value))
}

fn drawtext(
    text: &str,
    style: &TextStyle,
    role: TextRole,
    ctx: &CompositionContext,
    fallback_font: &str,
    enable: Option<(f64, f64)>,
) -> String {
    let font = style.font_path.as_deref().unwrap_or(fallback_font);
    let mut filter = format!(
        "drawtext=fontfile={font}:expansion=none:text={text}:fontsize={size}:\
         fontcolor={fill}:borderw={border}:bordercolor={border_color}:\
         x=(w-text_w)/2:y={y}",
        font = escape_filter_value(font),
        text = escape_filter_value(text),
        size = style.font_size(role, ctx.height),
        fill = style.color.fill(),
        border = TEXT_BORDER_WIDTH,
        border_color = style.color.border(),
        y = style.y_position(role, ctx.height),
    );
    if let Some((start, end)) = enable {
        filter.push_str(&format!(":enable='between(t,{start:.3},{end:.3})'"));
    }
    filter
}

/// A stage that has been decided on but not yet wired.
#[derive(Debug, Clone, Copy)]
enum StagePlan<'a> {
    Layout(LayoutMode),
    Title(&'a TitleOverlay),
    Subtitles(&'a SubtitleTrack),
}

impl StagePlan<'_> {
    fn kind(&self) -> StageKind {
        match self {
            StagePlan::Layout(_) => StageKind::Layout,
            StagePlan::Title(_) => StageKind::Title,
            StagePlan::Subtitles(_) => StageKind::Subtitles,
        }
    }

    fn build(&self, input: StreamNode, ctx: &CompositionContext) -> Stage {
        let kind = self.kind();
        let output = StreamNode::new(kind.output_name());
        let chains = match self {
            StagePlan::Layout(mode) => layout_chains(*mode, &input, &output, ctx),
            StagePlan::Title(title) => vec![FilterChain::new(
                &[&input],
                vec![drawtext(
                    &title.text,
                    &title.style,
                    TextRole::Title,
                    ctx,
                    &ctx.title_font,
                    None,
                )],
                &[&output],
            )],
            StagePlan::Subtitles(track) => {
                vec![FilterChain::new(&[&input], subtitle_filters(track, ctx), &[&output])]
            }
        };
        Stage {
            kind,
            input,
            output,
            chains,
        }
    }
}

fn layout_chains(
    mode: LayoutMode,
    input: &StreamNode,
    output: &StreamNode,
    ctx: &CompositionContext,
) -> Vec<FilterChain> {
    let (w, h, fps) = (ctx.width, ctx.height, ctx.fps);
    let finish = [format!("fps={fps}"), "setsar=1".to_string()];

    match mode {
        LayoutMode::BlurredBackground => {
            let bg = StreamNode::new("layout_bg");
            let fg = StreamNode::new("layout_fg");
            let blurred = StreamNode::new("layout_blurred");
            let main = StreamNode::new("layout_main");
            // main video takes 70% of the height, starting 15% from the top
            let main_h = h * 7 / 10;
            let top = h * 15 / 100;

            let mut overlay = vec![format!("overlay=(W-w)/2:{top}")];
            overlay.extend(finish);

            vec![
                FilterChain::new(&[input], vec!["split=2".to_string()], &[&bg, &fg]),
                FilterChain::new(
                    &[&bg],
                    vec![
                        format!("scale={w}:{h}:force_original_aspect_ratio=increase"),
                        format!("crop={w}:{h}"),
                        format!("gblur=sigma={BACKGROUND_BLUR_SIGMA}"),
                    ],
                    &[&blurred],
                ),
                FilterChain::new(
                    &[&fg],
                    vec![format!(
                        "scale={w}:{main_h}:force_original_aspect_ratio=decrease:force_divisible_by=2"
                    )],
                    &[&main],
                ),
                FilterChain::new(&[&blurred, &main], overlay, &[output]),
            ]
        }
        LayoutMode::CenterCrop => {
            let mut filters = vec![
                "crop='min(iw,ih*9/16)':'min(ih,iw*16/9)'".to_string(),
                format!("scale={w}:{h}"),
            ];
            filters.extend(finish);
            vec![FilterChain::new(&[input], filters, &[output])]
        }
        LayoutMode::Letterbox => {
            let mut filters = vec![
                format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
                format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black"),
            ];
            filters.extend(finish);
            vec![FilterChain::new(&[input], filters, &[output])]
        }
    }
}

fn subtitle_filters(track: &SubtitleTrack, ctx: &CompositionContext) -> Vec<String> {
    match track {
        SubtitleTrack::File { path, style } => {
            let font_size = style.font_size(TextRole::Subtitle, ctx.height);
            vec![format!(
                "subtitles=filename={}:original_size={}x{}:force_style='Fontsize={},Outline={}'",
                escape_filter_value(&path.to_string_lossy()),
                ctx.width,
                ctx.height,
                font_size,
                TEXT_BORDER_WIDTH,
            )]
        }
        SubtitleTrack::Cues { cues, style } => cues
            .iter()
            .flat_map(|cue| cue.words())
            .map(|word| {
                drawtext(
                    &word.text,
                    style,
                    TextRole::Subtitle,
                    ctx,
                    &ctx.subtitle_font,
                    Some((word.start, word.end)),
                )
            })
            .collect(),
    }
}

/// Stages a feature set asks for, in application order.
fn stage_plans(features: &FeatureSet) -> Vec<StagePlan<'_>> {
    let mut plans = vec![StagePlan::Layout(features.layout)];
    if let Some(title) = features.title.as_ref().filter(|_| features.has_title()) {
        plans.push(StagePlan::Title(title));
    }
    if let Some(track) = features.subtitles.as_ref().filter(|_| features.has_subtitles()) {
        plans.push(StagePlan::Subtitles(track));
    }
    plans
}

/// Build the processing pipeline for `features`. Deterministic.
pub fn compose(features: &FeatureSet, ctx: &CompositionContext) -> PipelineDescription {
    let (stages, terminal) = stage_plans(features).into_iter().fold(
        (Vec::new(), StreamNode::source()),
        |(mut stages, input), plan| {
            let stage = plan.build(input, ctx);
            let next = stage.output.clone();
            stages.push(stage);
            (stages, next)
        },
    );

    PipelineDescription {
        stages,
        terminal,
        fragments: features.fragments,
    }
}

/// Ordered stages plus the stream to map to the output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDescription {
    stages: Vec<Stage>,
    terminal: StreamNode,
    fragments: Option<FragmentSpec>,
}

impl PipelineDescription {
    /// Assemble a description from explicit parts. Call [`Self::validate`]
    /// before executing anything built this way.
    pub fn from_parts(
        stages: Vec<Stage>,
        terminal: StreamNode,
        fragments: Option<FragmentSpec>,
    ) -> Self {
        Self {
            stages,
            terminal,
            fragments,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn terminal(&self) -> &StreamNode {
        &self.terminal
    }

    pub fn fragments(&self) -> Option<FragmentSpec> {
        self.fragments
    }

    /// The `-filter_complex` text.
    pub fn filter_complex(&self) -> String {
        self.stages
            .iter()
            .flat_map(|s| s.chains.iter())
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Post-pipeline cuts for a composed video of `total_secs`. Empty when
    /// fragmentation was not requested.
    pub fn cut_list(&self, total_secs: f64) -> CutList {
        self.fragments
            .map(|spec| spec.cut_list(total_secs))
            .unwrap_or_default()
    }

    /// Check that every stream is produced before it is consumed, consumed at
    /// most once, and that the terminal stream is produced and left for the
    /// output mapping.
    pub fn validate(&self) -> MediaResult<()> {
        if self.stages.is_empty() {
            return Err(MediaError::composition("pipeline has no stages"));
        }

        let mut previous = StreamNode::source();
        for stage in &self.stages {
            if stage.input != previous {
                return Err(MediaError::composition(format!(
                    "{:?} stage reads {} but the previous stage produced {}",
                    stage.kind, stage.input, previous
                )));
            }
            previous = stage.output.clone();
        }

        let mut produced: HashSet<&StreamNode> = HashSet::new();
        let mut available: HashSet<&StreamNode> = HashSet::new();
        for chain in self.stages.iter().flat_map(|s| s.chains.iter()) {
            if chain.filters.is_empty() {
                return Err(MediaError::composition("filter chain without filters"));
            }
            for input in &chain.inputs {
                if input.is_input_pad() {
                    continue;
                }
                if !available.remove(input) {
                    let problem = if produced.contains(input) {
                        "consumed twice"
                    } else {
                        "consumed before any stage produced it"
                    };
                    return Err(MediaError::composition(format!("stream {input} {problem}")));
                }
            }
            for output in &chain.outputs {
                if !produced.insert(output) {
                    return Err(MediaError::composition(format!(
                        "stream {output} produced twice"
                    )));
                }
                available.insert(output);
            }
        }

        if !available.remove(&self.terminal) {
            return Err(MediaError::composition(format!(
                "terminal stream {} is not produced by any included stage",
                self.terminal
            )));
        }
        if let Some(dangling) = available.iter().next() {
            return Err(MediaError::composition(format!(
                "stream {dangling} is produced but never used"
            )));
        }
        Ok(())
    }
}

/// Convenience for callers holding a path to a subtitle file.
pub fn subtitle_file(path: impl AsRef<Path>, style: TextStyle) -> SubtitleTrack {
    SubtitleTrack::File {
        path: path.as_ref().to_path_buf(),
        style,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vshorts_models::{OutputQuality, SubtitleCue, TextColor, TextSize};

    fn features(title: bool, subtitles: bool) -> FeatureSet {
        let mut features = FeatureSet::default();
        if title {
            features = features.with_title(TitleOverlay::new("My Title"));
        }
        if subtitles {
            features = features.with_subtitles(SubtitleTrack::Cues {
                cues: vec![SubtitleCue::new(0.0, 2.0, "hello world")],
                style: TextStyle::default(),
            });
        }
        features
    }

    fn build(features: &FeatureSet) -> PipelineDescription {
        compose(features, &CompositionContext::for_features(features))
    }

    #[test]
    fn test_layout_only_terminal_is_layout() {
        let pipeline = build(&features(false, false));
        assert_eq!(pipeline.stage_count(), 1);
        assert_eq!(pipeline.terminal().as_str(), "layout");
        assert_eq!(pipeline.stages()[0].input, StreamNode::source());
        pipeline.validate().unwrap();
        assert!(!pipeline.filter_complex().contains("[output]"));
    }

    #[test]
    fn test_title_only_terminal_is_titled() {
        let pipeline = build(&features(true, false));
        assert_eq!(pipeline.stage_count(), 2);
        let stages = pipeline.stages();
        assert_eq!(stages[1].kind, StageKind::Title);
        assert_eq!(stages[1].input, stages[0].output);
        assert_eq!(pipeline.terminal(), &stages[1].output);
        assert_eq!(pipeline.terminal().as_str(), "titled");
        pipeline.validate().unwrap();
        assert!(!pipeline.filter_complex().contains("[output]"));
    }

    #[test]
    fn test_subtitles_only_reads_layout() {
        let pipeline = build(&features(false, true));
        let stages = pipeline.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].kind, StageKind::Layout);
        assert_eq!(stages[1].kind, StageKind::Subtitles);
        assert_eq!(stages[1].input, stages[0].output);
        assert_eq!(pipeline.terminal(), &stages[1].output);
        assert_eq!(pipeline.terminal().as_str(), "output");
        pipeline.validate().unwrap();
    }

    #[test]
    fn test_every_feature_combination_is_consistent() {
        for (title, subtitles) in [(false, false), (true, false), (false, true), (true, true)] {
            let pipeline = build(&features(title, subtitles));
            pipeline.validate().unwrap();

            let produced: Vec<_> = pipeline.stages().iter().map(|s| &s.output).collect();
            assert!(produced.contains(&pipeline.terminal()));
            assert_eq!(pipeline.stage_count(), 1 + title as usize + subtitles as usize);

            let graph = pipeline.filter_complex();
            assert!(graph.ends_with(&pipeline.terminal().label()), "{graph}");
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let features = features(true, true);
        let a = build(&features);
        let b = build(&features);
        assert_eq!(a, b);
        assert_eq!(a.filter_complex(), b.filter_complex());
    }

    #[test]
    fn test_validate_rejects_skipped_stage_reference() {
        // layout-only graph mapped to a stream nothing produced
        let good = build(&features(false, false));
        let broken = PipelineDescription::from_parts(
            good.stages().to_vec(),
            StreamNode::new("output"),
            None,
        );
        let err = broken.validate().unwrap_err();
        assert_eq!(err.kind(), vshorts_models::ErrorKind::CompositionInvariantViolation);
    }

    #[test]
    fn test_validate_rejects_broken_stage_chain() {
        let titled = build(&features(true, false));
        let mut stages = titled.stages().to_vec();
        stages[1].input = StreamNode::new("missing");
        let broken = PipelineDescription::from_parts(stages, StreamNode::new("titled"), None);
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_blurred_background_layout() {
        let pipeline = build(&features(false, false));
        let graph = pipeline.filter_complex();
        assert!(graph.starts_with("[0:v]split=2[layout_bg][layout_fg];"));
        assert!(graph.contains("scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,gblur=sigma=20[layout_blurred]"));
        // one scale bounded by both sides keeps the source aspect ratio
        assert!(graph.contains(
            "[layout_fg]scale=1080:1344:force_original_aspect_ratio=decrease:force_divisible_by=2[layout_main]"
        ));
        assert!(!graph.contains("iw*1344/ih"));
        assert!(graph.contains("[layout_blurred][layout_main]overlay=(W-w)/2:288,fps=30,setsar=1[layout]"));
    }

    #[test]
    fn test_other_layouts_and_quality() {
        let letterbox = FeatureSet::default()
            .with_layout(LayoutMode::Letterbox)
            .with_quality(OutputQuality::Hd720);
        let graph = build(&letterbox).filter_complex();
        assert_eq!(
            graph,
            "[0:v]scale=720:1280:force_original_aspect_ratio=decrease,pad=720:1280:(ow-iw)/2:(oh-ih)/2:color=black,fps=30,setsar=1[layout]"
        );

        let crop = FeatureSet::default().with_layout(LayoutMode::CenterCrop);
        let graph = build(&crop).filter_complex();
        assert!(graph.contains("crop='min(iw,ih*9/16)':'min(ih,iw*16/9)',scale=1080:1920"));
    }

    #[test]
    fn test_title_drawtext() {
        let mut features = features(true, false);
        features.title = Some(TitleOverlay {
            text: "Episode 1: it's on".into(),
            style: TextStyle::new(TextColor::Red, TextSize::Large),
        });
        let graph = build(&features).filter_complex();
        assert!(graph.contains("[layout]drawtext=fontfile=/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"));
        assert!(graph.contains(r":text=Episode 1\\: it\\\'s on:"));
        assert!(graph.contains("fontsize=96:fontcolor=red:borderw=3:bordercolor=white"));
        assert!(graph.contains("x=(w-text_w)/2:y=96[titled]"));
    }

    #[test]
    fn test_word_by_word_cues() {
        let pipeline = build(&features(false, true));
        let graph = pipeline.filter_complex();
        assert_eq!(graph.matches("drawtext=").count(), 2);
        assert!(graph.contains("text=hello"));
        assert!(graph.contains(":enable='between(t,0.000,1.000)'"));
        assert!(graph.contains(":enable='between(t,1.000,2.000)'[output]"));
    }

    #[test]
    fn test_subtitle_file_track() {
        let features = FeatureSet::default()
            .with_subtitles(subtitle_file("/tmp/my subs.srt", TextStyle::default()));
        let graph = build(&features).filter_complex();
        assert!(graph.contains("[layout]subtitles=filename=/tmp/my subs.srt:original_size=1080x1920"));
        assert!(graph.ends_with("[output]"));
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("a:b"), r"a\\:b");
        assert_eq!(escape_filter_value("it's"), r"it\\\'s");
        assert_eq!(escape_filter_value("a,b;[c]"), r"a\,b\;\[c\]");
        assert_eq!(escape_filter_value(r"C:\fonts"), r"C\\:\\\\fonts");
        assert_eq!(escape_filter_value("50%\nnext"), "50% next");
    }

    #[test]
    fn test_cut_list_follows_fragment_spec() {
        let pipeline = build(&FeatureSet::default().with_fragments(FragmentSpec::new(30)));
        assert_eq!(pipeline.cut_list(50.0).len(), 2);
        assert!(build(&FeatureSet::default()).cut_list(50.0).is_empty());
    }
}
