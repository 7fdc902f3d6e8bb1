//! Spectra map field data to colour through an ordered list of mapping stages.
//!
//! A [`Spectrum`] owns a position-ordered collection of [`SpectrumStage`]s.
//! Each stage reads one component of the input data vector,
//! normalizes it into its domain (linearly or logarithmically),
//! and writes a contribution into one or more colour channels.
//! Stages are evaluated in ascending position order,
//! so later stages may overwrite channels written by earlier ones.
//!
//! Evaluation on the CPU happens through [`Spectrum::evaluate`].
//! For the GPU path, see [`bake`][crate::lookup::bake],
//! which precomputes an equivalent lookup table.

use std::fmt::Write as _;

/// The colour type produced by spectrum evaluation.
///
/// Linear RGBA, since the values feed lighting math and texture bakes
/// rather than direct display.
pub type Color = palette::LinSrgba<f32>;

/// Resolution of the 1-D table backing the `Step` and `Banded` mappings.
///
/// Texels 0 and `BAND_TABLE_SIZE - 1` are reserved as fully white and
/// transparent, so that out-of-range coordinates clamped by the sampler
/// yield no contribution.
pub const BAND_TABLE_SIZE: usize = 1024;

/// How a stage normalizes a data value into its domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Transform {
    /// Plain linear interpolation between the domain endpoints.
    #[default]
    Linear,
    /// A signed-exaggeration log curve.
    /// The sign of [`SpectrumStage::exaggeration`] selects
    /// which end of the domain the resolution is concentrated at.
    Logarithmic,
}

/// How a stage's normalized value becomes a colour contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ColorMapping {
    /// Write the value into the alpha channel only.
    Alpha,
    /// Write the value into the red channel only.
    Red,
    /// Write the value into the green channel only.
    Green,
    /// Write the value into the blue channel only.
    Blue,
    /// Write the value into all three colour channels.
    Monochrome,
    /// A red-to-blue hue sweep (red, yellow, green, cyan, blue),
    /// piecewise linear with breakpoints at 1/6, 1/3, 1/2, 2/3 and 5/6.
    #[default]
    Rainbow,
    /// Interpolate from white to pure blue.
    WhiteToBlue,
    /// Interpolate from white to pure red.
    WhiteToRed,
    /// Black below the step threshold, white above,
    /// realized through a 1-D lookup table (see [`SpectrumStage::band_table`]).
    Step,
    /// Periodic black bands over a transparent background,
    /// realized through the same 1-D lookup table mechanism.
    Banded,
}

impl ColorMapping {
    /// The command keyword for this mapping in the stage listing form.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Alpha => "alpha",
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Monochrome => "monochrome",
            Self::Rainbow => "rainbow",
            Self::WhiteToBlue => "white_to_blue",
            Self::WhiteToRed => "white_to_red",
            Self::Step => "step",
            Self::Banded => "banded",
        }
    }

    fn from_keyword(kw: &str) -> Option<Self> {
        Some(match kw {
            "alpha" => Self::Alpha,
            "red" => Self::Red,
            "green" => Self::Green,
            "blue" => Self::Blue,
            "monochrome" => Self::Monochrome,
            "rainbow" => Self::Rainbow,
            "white_to_blue" => Self::WhiteToBlue,
            "white_to_red" => Self::WhiteToRed,
            "step" => Self::Step,
            "banded" => Self::Banded,
            _ => return None,
        })
    }

    /// Whether this mapping writes into the red/green/blue channels.
    pub fn writes_color(self) -> bool {
        !matches!(self, Self::Alpha)
    }

    /// Whether this mapping writes into the alpha channel.
    pub fn writes_alpha(self) -> bool {
        matches!(self, Self::Alpha)
    }
}

/// Which colour channels a spectrum writes, in aggregate over its stages.
///
/// Determines the texel layout of a baked lookup table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ChannelUsage {
    /// At least one stage writes red/green/blue.
    pub color: bool,
    /// At least one stage writes alpha.
    pub alpha: bool,
}

/// Error in parsing a stage from its command-string form.
#[derive(thiserror::Error, Debug)]
pub enum StageParseError {
    /// A token was not a known keyword.
    #[error("unknown keyword `{0}` in stage command")]
    UnknownKeyword(String),
    /// A keyword that takes values was not followed by enough of them.
    #[error("keyword `{0}` is missing a value")]
    MissingValue(&'static str),
    /// A value could not be parsed as a number.
    #[error("`{0}` is not a valid number")]
    InvalidNumber(String),
    /// The command did not name a colour mapping.
    #[error("stage command does not name a colour mapping")]
    MissingMapping,
}

/// One configurable rule converting a data component into a colour contribution.
///
/// A stage is created standalone and inserted into a [`Spectrum`]
/// with [`add_stage`][Spectrum::add_stage].
/// Stages are plain values; copying one into another spectrum
/// is just a `clone`.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectrumStage {
    /// How data values are normalized into the domain.
    pub transform: Transform,
    /// Exaggeration factor for the logarithmic transform.
    /// Negative values concentrate resolution at the top of the domain.
    pub exaggeration: f64,
    /// How the normalized value becomes colour.
    pub mapping: ColorMapping,
    /// Negate the normalized value before mapping.
    pub reverse: bool,
    /// Map data below the domain as if it were at the domain minimum.
    pub extend_below: bool,
    /// Map data above the domain as if it were at the domain maximum.
    pub extend_above: bool,
    /// Keep the domain minimum untouched by reranging,
    /// and exclude it from aggregate range expansion.
    pub fix_minimum: bool,
    /// Same as [`fix_minimum`][Self::fix_minimum] for the domain maximum.
    pub fix_maximum: bool,
    /// Index of the data component this stage reads.
    pub component: usize,
    /// Inactive stages are skipped during evaluation.
    pub active: bool,

    // domain and derived values carry invariants, so they stay private
    minimum: f64,
    maximum: f64,
    min_value: f32,
    max_value: f32,
    step_threshold: f64,
    band_count: u32,
    black_band_ratio: f64,
}

impl Default for SpectrumStage {
    fn default() -> Self {
        Self {
            transform: Transform::Linear,
            exaggeration: 1.0,
            mapping: ColorMapping::Rainbow,
            reverse: false,
            extend_below: false,
            extend_above: false,
            fix_minimum: false,
            fix_maximum: false,
            component: 0,
            active: true,
            minimum: 0.0,
            maximum: 1.0,
            min_value: 0.0,
            max_value: 1.0,
            step_threshold: 0.5,
            band_count: 10,
            black_band_ratio: 0.2,
        }
    }
}

impl SpectrumStage {
    /// Create a stage with the given mapping and otherwise default parameters.
    pub fn new(mapping: ColorMapping) -> Self {
        Self {
            mapping,
            ..Self::default()
        }
    }

    /// Builder-style variant of [`set_range`][Self::set_range].
    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.set_range(minimum, maximum);
        self
    }

    /// Builder-style setter for the source component index.
    pub fn with_component(mut self, component: usize) -> Self {
        self.component = component;
        self
    }

    /// Lower end of the input domain.
    #[inline]
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Upper end of the input domain.
    #[inline]
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// Set the input domain.
    ///
    /// Endpoints given in the wrong order are swapped.
    /// The step threshold is re-clamped into the new domain.
    pub fn set_range(&mut self, minimum: f64, maximum: f64) {
        if minimum <= maximum {
            self.minimum = minimum;
            self.maximum = maximum;
        } else {
            self.minimum = maximum;
            self.maximum = minimum;
        }
        self.set_step_threshold(self.step_threshold);
    }

    /// Lower end of the output sub-range, in [0, 1].
    #[inline]
    pub fn min_value(&self) -> f32 {
        self.min_value
    }

    /// Upper end of the output sub-range, in [0, 1].
    #[inline]
    pub fn max_value(&self) -> f32 {
        self.max_value
    }

    /// Set the output sub-range the normalized value is rescaled into.
    ///
    /// Values are clamped into [0, 1] and swapped if given in the wrong order.
    pub fn set_value_range(&mut self, min_value: f32, max_value: f32) {
        let lo = min_value.clamp(0.0, 1.0);
        let hi = max_value.clamp(0.0, 1.0);
        if lo <= hi {
            self.min_value = lo;
            self.max_value = hi;
        } else {
            self.min_value = hi;
            self.max_value = lo;
        }
    }

    /// Threshold of the `Step` mapping, in data units.
    #[inline]
    pub fn step_threshold(&self) -> f64 {
        self.step_threshold
    }

    /// Set the step threshold.
    ///
    /// The threshold is clamped into the open domain interval;
    /// a value landing on either domain boundary is re-centered
    /// to the domain midpoint.
    pub fn set_step_threshold(&mut self, threshold: f64) {
        let clamped = threshold.clamp(self.minimum, self.maximum);
        self.step_threshold = if clamped <= self.minimum || clamped >= self.maximum {
            0.5 * (self.minimum + self.maximum)
        } else {
            clamped
        };
    }

    /// Number of band divisions of the `Banded` mapping.
    #[inline]
    pub fn band_count(&self) -> u32 {
        self.band_count
    }

    /// Set the number of band divisions. At least one.
    pub fn set_band_count(&mut self, count: u32) {
        self.band_count = count.max(1);
    }

    /// Proportion of each band division covered by the black band.
    #[inline]
    pub fn black_band_ratio(&self) -> f64 {
        self.black_band_ratio
    }

    /// Set the black band proportion, clamped into [0, 1].
    pub fn set_black_band_ratio(&mut self, ratio: f64) {
        self.black_band_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Normalize a data value into [0, 1] according to the stage transform.
    ///
    /// A degenerate domain (minimum equal to maximum) normalizes
    /// to 0 at or below the domain and 1 above it.
    pub fn normalize(&self, x: f64) -> f64 {
        if self.maximum == self.minimum {
            return if x <= self.minimum { 0.0 } else { 1.0 };
        }
        let span = self.maximum - self.minimum;
        let t = match self.transform {
            Transform::Linear => (x - self.minimum) / span,
            Transform::Logarithmic => {
                let e = self.exaggeration;
                if e == 0.0 {
                    // zero exaggeration degenerates to the linear curve
                    (x - self.minimum) / span
                } else if e < 0.0 {
                    1.0 - (1.0 - e * (self.maximum - x) / span).ln() / (1.0 - e).ln()
                } else {
                    (1.0 + e * (x - self.minimum) / span).ln() / (1.0 + e).ln()
                }
            }
        };
        t.clamp(0.0, 1.0)
    }

    /// Normalize, reverse and rescale a data value
    /// into the stage's output sub-range.
    pub fn update(&self, x: f64) -> f64 {
        let mut t = self.normalize(x);
        if self.reverse {
            t = 1.0 - t;
        }
        self.min_value as f64 + t * (self.max_value - self.min_value) as f64
    }

    /// One texel of the stage's 1-D banding/step table.
    ///
    /// Texel values are RGBA bytes; alpha zero means "no contribution".
    /// The outermost texels are the reserved white, transparent edge.
    pub fn band_texel(&self, index: usize) -> [u8; 4] {
        const WHITE_CLEAR: [u8; 4] = [255, 255, 255, 0];
        const BLACK: [u8; 4] = [0, 0, 0, 255];
        const WHITE: [u8; 4] = [255, 255, 255, 255];

        if index == 0 || index >= BAND_TABLE_SIZE - 1 {
            return WHITE_CLEAR;
        }
        let t = (index - 1) as f64 / (BAND_TABLE_SIZE - 3) as f64;
        match self.mapping {
            ColorMapping::Banded => {
                // black bands centered within each band division
                let f = (t * self.band_count as f64).fract();
                if (f - 0.5).abs() < 0.5 * self.black_band_ratio {
                    BLACK
                } else {
                    WHITE_CLEAR
                }
            }
            ColorMapping::Step => {
                if t < self.update(self.step_threshold) {
                    BLACK
                } else {
                    WHITE
                }
            }
            _ => WHITE_CLEAR,
        }
    }

    /// The full 1-D banding/step table, ready for texture upload.
    pub fn band_table(&self) -> Vec<[u8; 4]> {
        (0..BAND_TABLE_SIZE).map(|i| self.band_texel(i)).collect()
    }

    /// The banding-table coordinate selected for a data value,
    /// in normalized [0, 1] texture space.
    ///
    /// In-domain values land on interior texels.
    /// Out-of-domain values on a side without the extend flag are pushed
    /// far outside [0, 1] so a clamping sampler hits the reserved edge texel.
    pub fn band_coord(&self, x: f64) -> f64 {
        if x < self.minimum && !self.extend_below {
            return -999.0;
        }
        if x > self.maximum && !self.extend_above {
            return 1000.0;
        }
        let v = self.update(x);
        let n = BAND_TABLE_SIZE as f64;
        // scale into the interior texels, sparing the reserved edge ones
        (1.0 + v * (n - 3.0)) / (n - 1.0)
    }

    fn band_sample(&self, coord: f64) -> [u8; 4] {
        let idx = (coord.clamp(0.0, 1.0) * (BAND_TABLE_SIZE - 1) as f64).round() as usize;
        self.band_texel(idx)
    }

    /// Apply this stage's contribution to a colour.
    ///
    /// Inactive stages and stages whose component index is outside
    /// the supplied data vector contribute nothing.
    /// Out-of-domain data on a side without its extend flag
    /// also contributes nothing.
    pub fn apply(&self, data: &[f64], color: &mut Color) {
        if !self.active {
            return;
        }
        let Some(&x) = data.get(self.component) else {
            return;
        };

        if matches!(self.mapping, ColorMapping::Step | ColorMapping::Banded) {
            let texel = self.band_sample(self.band_coord(x));
            if texel[3] > 0 {
                let v = texel[0] as f32 / 255.0;
                color.red = v;
                color.green = v;
                color.blue = v;
            }
            return;
        }

        if (x < self.minimum && !self.extend_below) || (x > self.maximum && !self.extend_above) {
            return;
        }
        let v = self.update(x) as f32;
        match self.mapping {
            ColorMapping::Alpha => color.alpha = v,
            ColorMapping::Red => color.red = v,
            ColorMapping::Green => color.green = v,
            ColorMapping::Blue => color.blue = v,
            ColorMapping::Monochrome => {
                color.red = v;
                color.green = v;
                color.blue = v;
            }
            ColorMapping::Rainbow => {
                let [r, g, b] = rainbow(v as f64);
                color.red = r;
                color.green = g;
                color.blue = b;
            }
            ColorMapping::WhiteToBlue => {
                color.red = 1.0 - v;
                color.green = 1.0 - v;
                color.blue = 1.0;
            }
            ColorMapping::WhiteToRed => {
                color.red = 1.0;
                color.green = 1.0 - v;
                color.blue = 1.0 - v;
            }
            // handled above
            ColorMapping::Step | ColorMapping::Banded => unreachable!(),
        }
    }

    /// The human-readable command form of this stage.
    ///
    /// `position` is the 1-based position printed at the front of the line.
    /// The same form is accepted by [`from_command_str`][Self::from_command_str].
    pub fn command_string(&self, position: usize) -> String {
        let mut out = String::new();
        write!(out, "{}. {}", position, self.mapping.keyword()).unwrap();
        if self.reverse {
            out.push_str(" reverse");
        }
        write!(out, " range {} {}", self.minimum, self.maximum).unwrap();
        if self.extend_above {
            out.push_str(" extend_above");
        }
        if self.extend_below {
            out.push_str(" extend_below");
        }
        if self.fix_maximum {
            out.push_str(" fix_maximum");
        }
        if self.fix_minimum {
            out.push_str(" fix_minimum");
        }
        match self.mapping {
            ColorMapping::Step => {
                write!(out, " step_value {}", self.step_threshold).unwrap();
            }
            ColorMapping::Banded => {
                write!(
                    out,
                    " bands {} band_ratio {}",
                    self.band_count, self.black_band_ratio
                )
                .unwrap();
            }
            _ => {}
        }
        write!(out, " component {}", self.component).unwrap();
        out
    }

    /// Parse a stage from its command form.
    ///
    /// The leading `<position>.` token is accepted and ignored;
    /// positions belong to the owning spectrum, not the stage.
    pub fn from_command_str(command: &str) -> Result<Self, StageParseError> {
        let mut stage = Self::default();
        let mut mapping = None;
        let mut range = None;

        let mut tokens = command.split_whitespace().peekable();
        // skip the position prefix if present
        if let Some(first) = tokens.peek() {
            if first.ends_with('.') && first[..first.len() - 1].parse::<usize>().is_ok() {
                tokens.next();
            }
        }

        fn number<'a>(
            tokens: &mut impl Iterator<Item = &'a str>,
            kw: &'static str,
        ) -> Result<f64, StageParseError> {
            let tok = tokens.next().ok_or(StageParseError::MissingValue(kw))?;
            tok.parse()
                .map_err(|_| StageParseError::InvalidNumber(tok.to_string()))
        }

        while let Some(tok) = tokens.next() {
            match tok {
                "reverse" => stage.reverse = true,
                "extend_above" => stage.extend_above = true,
                "extend_below" => stage.extend_below = true,
                "fix_maximum" => stage.fix_maximum = true,
                "fix_minimum" => stage.fix_minimum = true,
                "range" => {
                    let lo = number(&mut tokens, "range")?;
                    let hi = number(&mut tokens, "range")?;
                    range = Some((lo, hi));
                }
                "step_value" => {
                    let v = number(&mut tokens, "step_value")?;
                    stage.step_threshold = v;
                }
                "bands" => {
                    let v = number(&mut tokens, "bands")?;
                    stage.set_band_count(v as u32);
                }
                "band_ratio" => {
                    let v = number(&mut tokens, "band_ratio")?;
                    stage.set_black_band_ratio(v);
                }
                "component" => {
                    let v = number(&mut tokens, "component")?;
                    stage.component = v as usize;
                }
                kw => match ColorMapping::from_keyword(kw) {
                    Some(m) => mapping = Some(m),
                    None => return Err(StageParseError::UnknownKeyword(kw.to_string())),
                },
            }
        }

        stage.mapping = mapping.ok_or(StageParseError::MissingMapping)?;
        if let Some((lo, hi)) = range {
            // setting the range last also re-clamps a parsed step threshold
            let threshold = stage.step_threshold;
            stage.set_range(lo, hi);
            stage.set_step_threshold(threshold);
        }
        Ok(stage)
    }
}

/// The rainbow hue sweep.
///
/// Piecewise linear in each channel with breakpoints
/// at 1/6, 1/3, 1/2, 2/3 and 5/6:
/// red holds at 1 until 1/3 and falls to 0 by 1/2,
/// blue rises from 1/3 through 0.25 at 1/2 and reaches 1 at 2/3,
/// green ramps up over the first third and back down over the last,
/// steeply near the ends.
fn rainbow(v: f64) -> [f32; 3] {
    let v = v.clamp(0.0, 1.0);
    let r = if v < 1.0 / 3.0 {
        1.0
    } else if v < 0.5 {
        1.0 - 6.0 * (v - 1.0 / 3.0)
    } else {
        0.0
    };
    let g = if v < 1.0 / 6.0 {
        4.5 * v
    } else if v < 1.0 / 3.0 {
        0.75 + 1.5 * (v - 1.0 / 6.0)
    } else if v < 2.0 / 3.0 {
        1.0
    } else if v < 5.0 / 6.0 {
        1.0 - 1.5 * (v - 2.0 / 3.0)
    } else {
        0.75 - 4.5 * (v - 5.0 / 6.0)
    };
    let b = if v < 1.0 / 3.0 {
        0.0
    } else if v < 0.5 {
        1.5 * (v - 1.0 / 3.0)
    } else if v < 2.0 / 3.0 {
        0.25 + 4.5 * (v - 0.5)
    } else {
        1.0
    };
    [r as f32, g as f32, b as f32]
}

/// An ordered pipeline of colour-mapping stages.
///
/// Stage positions are 1-based and always form a dense `1..=len` sequence;
/// inserting or removing a stage renumbers the ones after it.
#[derive(Clone, Debug, Default)]
pub struct Spectrum {
    /// Name used to refer to this spectrum in listings and caches.
    pub name: String,
    // index i holds the stage at position i + 1
    stages: Vec<SpectrumStage>,
}

impl Spectrum {
    /// Create an empty spectrum.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Number of stages.
    #[inline]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the spectrum has no stages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterate over the stages in position order.
    #[inline]
    pub fn stages(&self) -> impl Iterator<Item = &SpectrumStage> {
        self.stages.iter()
    }

    /// Get the stage at a 1-based position.
    #[inline]
    pub fn stage(&self, position: usize) -> Option<&SpectrumStage> {
        position.checked_sub(1).and_then(|i| self.stages.get(i))
    }

    /// Get the stage at a 1-based position for mutation.
    #[inline]
    pub fn stage_mut(&mut self, position: usize) -> Option<&mut SpectrumStage> {
        position.checked_sub(1).and_then(|i| self.stages.get_mut(i))
    }

    /// Insert a stage at a 1-based position,
    /// renumbering all subsequent stages up.
    ///
    /// Positions outside `1..=len + 1` are clamped,
    /// so any position can be used to append.
    pub fn add_stage(&mut self, stage: SpectrumStage, position: usize) {
        let idx = position.clamp(1, self.stages.len() + 1) - 1;
        self.stages.insert(idx, stage);
    }

    /// Append a stage at the end of the pipeline.
    pub fn push_stage(&mut self, stage: SpectrumStage) {
        self.stages.push(stage);
    }

    /// Remove and return the stage at a 1-based position,
    /// renumbering all subsequent stages down.
    pub fn remove_stage(&mut self, position: usize) -> Option<SpectrumStage> {
        let idx = position.checked_sub(1)?;
        (idx < self.stages.len()).then(|| self.stages.remove(idx))
    }

    /// Number of data components the spectrum reads:
    /// one past the largest component index among active stages.
    pub fn component_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.active)
            .map(|s| s.component + 1)
            .max()
            .unwrap_or(0)
    }

    /// Which colour channels the active stages write.
    pub fn channel_usage(&self) -> ChannelUsage {
        let mut usage = ChannelUsage::default();
        for stage in self.stages.iter().filter(|s| s.active) {
            usage.color |= stage.mapping.writes_color();
            usage.alpha |= stage.mapping.writes_alpha();
        }
        usage
    }

    /// Apply every stage to a colour in ascending position order.
    pub fn apply(&self, data: &[f64], color: &mut Color) {
        for stage in &self.stages {
            stage.apply(data, color);
        }
    }

    /// Evaluate the spectrum over an opaque black base colour.
    pub fn evaluate(&self, data: &[f64]) -> Color {
        let mut color = Color::new(0.0, 0.0, 0.0, 1.0);
        self.apply(data, &mut color);
        color
    }

    /// The aggregate data range covered by the stages.
    ///
    /// Folds stage domains in position order;
    /// a fixed minimum (or maximum) is excluded from the expansion,
    /// unless every stage fixes that side,
    /// in which case the fixed values are used as a fallback.
    /// Returns `None` for an empty spectrum.
    pub fn calculate_range(&self) -> Option<(f64, f64)> {
        if self.stages.is_empty() {
            return None;
        }
        let min = self
            .stages
            .iter()
            .filter(|s| !s.fix_minimum)
            .map(|s| s.minimum)
            .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.min(v))))
            .or_else(|| self.stages.iter().map(|s| s.minimum).reduce(f64::min));
        let max = self
            .stages
            .iter()
            .filter(|s| !s.fix_maximum)
            .map(|s| s.maximum)
            .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))))
            .or_else(|| self.stages.iter().map(|s| s.maximum).reduce(f64::max));
        min.zip(max)
    }

    /// Proportionally rescale every stage's domain into a new aggregate range.
    ///
    /// Each non-fixed endpoint is mapped linearly from the old aggregate
    /// range to the new one, preserving the shape of each stage's sub-range.
    /// Fixed sides are left untouched.
    /// Step thresholds follow the same mapping
    /// (except on stages fixed at both ends)
    /// and are then re-clamped into their stage's new domain.
    pub fn rerange(&mut self, new_min: f64, new_max: f64) {
        let Some((old_min, old_max)) = self.calculate_range() else {
            return;
        };
        let old_span = old_max - old_min;
        let scale = if old_span == 0.0 {
            1.0
        } else {
            (new_max - new_min) / old_span
        };
        let remap = |v: f64| new_min + (v - old_min) * scale;

        for stage in &mut self.stages {
            let lo = if stage.fix_minimum {
                stage.minimum
            } else {
                remap(stage.minimum)
            };
            let hi = if stage.fix_maximum {
                stage.maximum
            } else {
                remap(stage.maximum)
            };
            let threshold = if stage.fix_minimum && stage.fix_maximum {
                stage.step_threshold
            } else {
                remap(stage.step_threshold)
            };
            stage.set_range(lo, hi);
            stage.set_step_threshold(threshold);
        }
    }

    /// The command-form listing of every stage, in position order.
    pub fn stage_commands(&self) -> Vec<String> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, s)| s.command_string(i + 1))
            .collect()
    }
}

/// Ready-made spectra for common visualization setups.
pub mod builtin_spectra {
    use super::*;

    /// A single linear rainbow stage over [0, 1].
    pub fn rainbow() -> Spectrum {
        let mut s = Spectrum::new("rainbow");
        s.push_stage(SpectrumStage::new(ColorMapping::Rainbow));
        s
    }

    /// A single linear grayscale stage over [0, 1].
    pub fn monochrome() -> Spectrum {
        let mut s = Spectrum::new("monochrome");
        s.push_stage(SpectrumStage::new(ColorMapping::Monochrome));
        s
    }

    /// White fading to pure blue over [0, 1].
    pub fn white_to_blue() -> Spectrum {
        let mut s = Spectrum::new("white_to_blue");
        s.push_stage(SpectrumStage::new(ColorMapping::WhiteToBlue));
        s
    }

    /// White fading to pure red over [0, 1].
    pub fn white_to_red() -> Spectrum {
        let mut s = Spectrum::new("white_to_red");
        s.push_stage(SpectrumStage::new(ColorMapping::WhiteToRed));
        s
    }

    /// A rainbow sweep overlaid with black contour bands.
    pub fn banded_contours(bands: u32) -> Spectrum {
        let mut s = Spectrum::new("banded_contours");
        s.push_stage(SpectrumStage::new(ColorMapping::Rainbow));
        let mut contours = SpectrumStage::new(ColorMapping::Banded);
        contours.set_band_count(bands);
        s.push_stage(contours);
        s
    }

    /// All builtin spectra.
    pub fn all_builtins() -> Vec<Spectrum> {
        vec![
            rainbow(),
            monochrome(),
            white_to_blue(),
            white_to_red(),
            banded_contours(10),
        ]
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rainbow_stage(min: f64, max: f64) -> SpectrumStage {
        SpectrumStage::new(ColorMapping::Rainbow).with_range(min, max)
    }

    #[test]
    fn rainbow_endpoints() {
        let s = rainbow_stage(0.0, 1.0);
        let mut c = Color::new(0.0, 0.0, 0.0, 1.0);
        s.apply(&[0.0], &mut c);
        assert_abs_diff_eq!(c.red, 1.0);
        assert_abs_diff_eq!(c.green, 0.0);
        assert_abs_diff_eq!(c.blue, 0.0);

        let mut c = Color::new(0.0, 0.0, 0.0, 1.0);
        s.apply(&[1.0], &mut c);
        assert_abs_diff_eq!(c.red, 0.0);
        assert_abs_diff_eq!(c.green, 0.0);
        assert_abs_diff_eq!(c.blue, 1.0);

        // the midpoint sits in the green/cyan transition band
        let mut c = Color::new(0.0, 0.0, 0.0, 1.0);
        s.apply(&[0.5], &mut c);
        assert_abs_diff_eq!(c.red, 0.0);
        assert_abs_diff_eq!(c.green, 1.0);
        assert!(c.blue >= 0.25 && c.blue <= 0.5);
    }

    #[test]
    fn rainbow_is_continuous() {
        // no jumps at the breakpoints
        for bp in [1.0 / 6.0, 1.0 / 3.0, 0.5, 2.0 / 3.0, 5.0 / 6.0] {
            let lo = rainbow(bp - 1e-7);
            let hi = rainbow(bp + 1e-7);
            for ch in 0..3 {
                assert!(
                    (lo[ch] - hi[ch]).abs() < 1e-5,
                    "discontinuity at {bp} in channel {ch}"
                );
            }
        }
    }

    #[test]
    fn reverse_equals_swapped_domain() {
        let mut reversed = rainbow_stage(2.0, 10.0);
        reversed.reverse = true;

        // a reversed linear stage maps like one with swapped endpoints
        let swapped = rainbow_stage(2.0, 10.0);
        for i in 0..=20 {
            let x = 2.0 + 8.0 * i as f64 / 20.0;
            let mirrored = 2.0 + 10.0 - x;
            assert_abs_diff_eq!(reversed.update(x), swapped.update(mirrored), epsilon = 1e-12);
        }
    }

    #[test]
    fn log_normalize_endpoints_and_symmetry() {
        let mut stage = SpectrumStage::new(ColorMapping::Monochrome).with_range(1.0, 5.0);
        stage.transform = Transform::Logarithmic;
        stage.exaggeration = 3.0;

        assert_abs_diff_eq!(stage.normalize(1.0), 0.0);
        assert_abs_diff_eq!(stage.normalize(5.0), 1.0);
        // resolution concentrated at the low end: midpoint normalizes above 0.5
        assert!(stage.normalize(3.0) > 0.5);

        // negative exaggeration mirrors the curve
        let mut neg = stage.clone();
        neg.exaggeration = -3.0;
        for i in 0..=10 {
            let x = 1.0 + 4.0 * i as f64 / 10.0;
            assert_abs_diff_eq!(
                neg.normalize(x),
                1.0 - stage.normalize(1.0 + 5.0 - x),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn degenerate_domain_normalizes_to_step() {
        let stage = SpectrumStage::new(ColorMapping::Monochrome).with_range(3.0, 3.0);
        assert_eq!(stage.normalize(2.0), 0.0);
        assert_eq!(stage.normalize(3.0), 0.0);
        assert_eq!(stage.normalize(3.1), 1.0);
    }

    #[test]
    fn extend_flags_gate_out_of_domain_values() {
        let base = Color::new(0.25, 0.25, 0.25, 1.0);
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(0.0, 100.0));

        // in-domain endpoints
        let c = spectrum.evaluate(&[0.0]);
        assert_abs_diff_eq!(c.red, 1.0);
        let c = spectrum.evaluate(&[100.0]);
        assert_abs_diff_eq!(c.blue, 1.0);

        // out of domain without the flag: base colour untouched
        let mut c = base;
        spectrum.apply(&[150.0], &mut c);
        assert_eq!(c, base);

        // with the flag: mapped as the domain maximum
        spectrum.stage_mut(1).unwrap().extend_above = true;
        let mut c = base;
        spectrum.apply(&[150.0], &mut c);
        assert_abs_diff_eq!(c.blue, 1.0);
        assert_abs_diff_eq!(c.red, 0.0);
    }

    #[test]
    fn inactive_and_out_of_component_stages_contribute_nothing() {
        let base = Color::new(0.5, 0.5, 0.5, 1.0);

        let mut inactive = rainbow_stage(0.0, 1.0);
        inactive.active = false;
        let mut c = base;
        inactive.apply(&[0.5], &mut c);
        assert_eq!(c, base);

        let far_component = rainbow_stage(0.0, 1.0).with_component(3);
        let mut c = base;
        far_component.apply(&[0.5], &mut c);
        assert_eq!(c, base);
    }

    #[test]
    fn positions_stay_dense() {
        let mut spectrum = Spectrum::new("test");
        for i in 0..5 {
            spectrum.add_stage(rainbow_stage(i as f64, i as f64 + 1.0), i + 1);
        }
        spectrum.remove_stage(2);
        spectrum.add_stage(rainbow_stage(9.0, 10.0), 2);
        spectrum.remove_stage(5);
        spectrum.remove_stage(1);

        assert_eq!(spectrum.len(), 3);
        // every position in 1..=len resolves, none past it
        for pos in 1..=spectrum.len() {
            assert!(spectrum.stage(pos).is_some());
        }
        assert!(spectrum.stage(spectrum.len() + 1).is_none());
    }

    #[test]
    fn rerange_is_idempotent_at_current_range() {
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(0.0, 10.0));
        spectrum.push_stage(rainbow_stage(5.0, 20.0));

        let (min, max) = spectrum.calculate_range().unwrap();
        assert_eq!((min, max), (0.0, 20.0));

        spectrum.rerange(min, max);
        assert_abs_diff_eq!(spectrum.stage(1).unwrap().minimum(), 0.0);
        assert_abs_diff_eq!(spectrum.stage(1).unwrap().maximum(), 10.0);
        assert_abs_diff_eq!(spectrum.stage(2).unwrap().minimum(), 5.0);
        assert_abs_diff_eq!(spectrum.stage(2).unwrap().maximum(), 20.0);
    }

    #[test]
    fn rerange_scales_proportionally_and_respects_fixed_sides() {
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(0.0, 10.0));
        let mut fixed = rainbow_stage(2.0, 10.0);
        fixed.fix_minimum = true;
        spectrum.push_stage(fixed);

        spectrum.rerange(0.0, 20.0);
        assert_abs_diff_eq!(spectrum.stage(1).unwrap().minimum(), 0.0);
        assert_abs_diff_eq!(spectrum.stage(1).unwrap().maximum(), 20.0);
        // fixed side untouched, free side scaled
        assert_abs_diff_eq!(spectrum.stage(2).unwrap().minimum(), 2.0);
        assert_abs_diff_eq!(spectrum.stage(2).unwrap().maximum(), 20.0);
    }

    #[test]
    fn fixed_sides_are_excluded_from_range_expansion() {
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(2.0, 8.0));
        let mut wide = rainbow_stage(-100.0, 100.0);
        wide.fix_minimum = true;
        wide.fix_maximum = true;
        spectrum.push_stage(wide);

        assert_eq!(spectrum.calculate_range(), Some((2.0, 8.0)));
    }

    #[test]
    fn step_threshold_is_clamped_and_recentered() {
        let mut stage = SpectrumStage::new(ColorMapping::Step).with_range(0.0, 10.0);
        stage.set_step_threshold(4.0);
        assert_eq!(stage.step_threshold(), 4.0);
        // boundary values re-center to the midpoint
        stage.set_step_threshold(0.0);
        assert_eq!(stage.step_threshold(), 5.0);
        stage.set_step_threshold(25.0);
        assert_eq!(stage.step_threshold(), 5.0);
        // shrinking the range re-clamps
        stage.set_step_threshold(9.0);
        stage.set_range(0.0, 4.0);
        assert_eq!(stage.step_threshold(), 2.0);
    }

    #[test]
    fn banded_edge_texels_are_reserved_white() {
        let stage = SpectrumStage::new(ColorMapping::Banded);
        assert_eq!(stage.band_texel(0), [255, 255, 255, 0]);
        assert_eq!(stage.band_texel(BAND_TABLE_SIZE - 1), [255, 255, 255, 0]);
    }

    #[test]
    fn banded_out_of_range_contributes_nothing() {
        let stage = SpectrumStage::new(ColorMapping::Banded).with_range(0.0, 1.0);
        assert!(stage.band_coord(2.0) >= 1000.0);
        assert!(stage.band_coord(-1.0) <= -999.0);

        let base = Color::new(0.5, 0.5, 0.5, 1.0);
        let mut c = base;
        stage.apply(&[2.0], &mut c);
        assert_eq!(c, base);
    }

    #[test]
    fn step_divides_black_from_white() {
        let mut stage = SpectrumStage::new(ColorMapping::Step).with_range(0.0, 10.0);
        stage.set_step_threshold(5.0);

        let mut c = Color::new(0.5, 0.5, 0.5, 1.0);
        stage.apply(&[1.0], &mut c);
        assert_eq!((c.red, c.green, c.blue), (0.0, 0.0, 0.0));

        let mut c = Color::new(0.5, 0.5, 0.5, 1.0);
        stage.apply(&[9.0], &mut c);
        assert_eq!((c.red, c.green, c.blue), (1.0, 1.0, 1.0));
    }

    #[test]
    fn later_stages_overwrite_earlier_channels() {
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(0.0, 1.0));
        spectrum.push_stage(
            SpectrumStage::new(ColorMapping::Red)
                .with_range(0.0, 1.0)
                .with_component(0),
        );
        let c = spectrum.evaluate(&[1.0]);
        // rainbow said red = 0, the later red stage overwrites it
        assert_abs_diff_eq!(c.red, 1.0);
        assert_abs_diff_eq!(c.blue, 1.0);
    }

    #[test]
    fn channel_usage_and_component_count() {
        let mut spectrum = Spectrum::new("test");
        spectrum.push_stage(rainbow_stage(0.0, 1.0));
        let alpha = SpectrumStage::new(ColorMapping::Alpha).with_component(2);
        spectrum.push_stage(alpha);

        assert_eq!(spectrum.component_count(), 3);
        let usage = spectrum.channel_usage();
        assert!(usage.color);
        assert!(usage.alpha);

        // deactivating the alpha stage removes both its channel and component
        spectrum.stage_mut(2).unwrap().active = false;
        assert_eq!(spectrum.component_count(), 1);
        assert!(!spectrum.channel_usage().alpha);
    }

    #[test]
    fn command_string_round_trips() {
        let mut stage = SpectrumStage::new(ColorMapping::Banded).with_range(0.0, 100.0);
        stage.reverse = true;
        stage.extend_above = true;
        stage.fix_minimum = true;
        stage.set_band_count(6);
        stage.set_black_band_ratio(0.25);
        stage.component = 1;

        let cmd = stage.command_string(3);
        assert_eq!(
            cmd,
            "3. banded reverse range 0 100 extend_above fix_minimum bands 6 band_ratio 0.25 component 1"
        );
        let parsed = SpectrumStage::from_command_str(&cmd).unwrap();
        assert_eq!(parsed, stage);
    }

    #[test]
    fn command_string_step_round_trips() {
        let mut stage = SpectrumStage::new(ColorMapping::Step).with_range(-5.0, 5.0);
        stage.set_step_threshold(1.5);
        let cmd = stage.command_string(1);
        assert_eq!(cmd, "1. step range -5 5 step_value 1.5 component 0");
        let parsed = SpectrumStage::from_command_str(&cmd).unwrap();
        assert_eq!(parsed, stage);
    }

    #[test]
    fn command_parse_rejects_garbage() {
        assert!(matches!(
            SpectrumStage::from_command_str("1. rainbow range zero one"),
            Err(StageParseError::InvalidNumber(_))
        ));
        assert!(matches!(
            SpectrumStage::from_command_str("1. sparkles range 0 1"),
            Err(StageParseError::UnknownKeyword(_))
        ));
        assert!(matches!(
            SpectrumStage::from_command_str("range 0 1"),
            Err(StageParseError::MissingMapping)
        ));
    }
}
