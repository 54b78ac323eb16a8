use crate::error::PageBindError;

// All lengths are canonical device pixels at 96 dpi.
pub const PX_PER_IN: f64 = 96.0;
pub const PX_PER_CM: f64 = PX_PER_IN / 2.54;
pub const PX_PER_MM: f64 = PX_PER_IN / 25.4;
pub const PX_PER_PT: f64 = PX_PER_IN / 72.0;
pub const PX_PER_PC: f64 = 16.0;

/// Parses a `<integer><unit>` token (px, cm, mm, in, pc, pt) into pixels.
pub fn parse_length(token: &str) -> Result<f64, PageBindError> {
    let token = token.trim();
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| PageBindError::InvalidLength(token.to_string()))?;
    let (digits, unit) = token.split_at(split);
    if digits.is_empty() {
        return Err(PageBindError::InvalidLength(token.to_string()));
    }
    let value: i64 = digits
        .parse()
        .map_err(|_| PageBindError::InvalidLength(token.to_string()))?;
    let factor = match unit {
        "px" => 1.0,
        "pt" => PX_PER_PT,
        "pc" => PX_PER_PC,
        "in" => PX_PER_IN,
        "cm" => PX_PER_CM,
        "mm" => PX_PER_MM,
        _ => return Err(PageBindError::InvalidLength(token.to_string())),
    };
    Ok(value as f64 * factor)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaperFormat {
    A5,
    A4,
    A3,
    B5,
    B4,
    JisB5,
    JisB4,
    Letter,
    Legal,
    Ledger,
    Custom { width: f64, height: f64 },
}

impl PaperFormat {
    /// Parses a paper token: a named preset or two space-separated lengths.
    pub fn parse(token: &str) -> Result<Self, PageBindError> {
        let trimmed = token.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "a5" => return Ok(PaperFormat::A5),
            "a4" => return Ok(PaperFormat::A4),
            "a3" => return Ok(PaperFormat::A3),
            "b5" => return Ok(PaperFormat::B5),
            "b4" => return Ok(PaperFormat::B4),
            "jis-b5" => return Ok(PaperFormat::JisB5),
            "jis-b4" => return Ok(PaperFormat::JisB4),
            "letter" => return Ok(PaperFormat::Letter),
            "legal" => return Ok(PaperFormat::Legal),
            "ledger" => return Ok(PaperFormat::Ledger),
            _ => {}
        }
        let mut parts = trimmed.split_whitespace();
        let (Some(first), Some(second), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(PageBindError::InvalidPaper(token.to_string()));
        };
        let width = parse_length(first).map_err(|_| PageBindError::InvalidPaper(token.to_string()))?;
        let height =
            parse_length(second).map_err(|_| PageBindError::InvalidPaper(token.to_string()))?;
        Ok(PaperFormat::Custom { width, height })
    }

    /// Portrait width and height in pixels.
    pub fn size(&self) -> (f64, f64) {
        let mm = |w: f64, h: f64| (w * PX_PER_MM, h * PX_PER_MM);
        match self {
            PaperFormat::A5 => mm(148.0, 210.0),
            PaperFormat::A4 => mm(210.0, 297.0),
            PaperFormat::A3 => mm(297.0, 420.0),
            PaperFormat::B5 => mm(176.0, 250.0),
            PaperFormat::B4 => mm(250.0, 353.0),
            PaperFormat::JisB5 => mm(182.0, 257.0),
            PaperFormat::JisB4 => mm(257.0, 364.0),
            PaperFormat::Letter => mm(215.9, 279.4),
            PaperFormat::Legal => mm(215.9, 355.6),
            PaperFormat::Ledger => mm(279.4, 431.8),
            PaperFormat::Custom { width, height } => (*width, *height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginBox {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl MarginBox {
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    /// Parses a margin token: one length for all sides, or four lengths
    /// in top/right/bottom/left order.
    pub fn parse(token: &str) -> Result<Self, PageBindError> {
        let lengths: Vec<f64> = token
            .split_whitespace()
            .map(parse_length)
            .collect::<Result<_, _>>()
            .map_err(|_| PageBindError::InvalidMargin(token.to_string()))?;
        match lengths.as_slice() {
            [all] => Ok(MarginBox::uniform(*all)),
            [top, right, bottom, left] => Ok(MarginBox {
                top: *top,
                right: *right,
                bottom: *bottom,
                left: *left,
            }),
            _ => Err(PageBindError::InvalidMargin(token.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn parse(token: &str) -> Result<Self, PageBindError> {
        match token.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            _ => Err(PageBindError::InvalidOrientation(token.to_string())),
        }
    }
}

/// One resolved paper configuration: format, margins and orientation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSpec {
    pub format: PaperFormat,
    pub margin: MarginBox,
    pub orientation: Orientation,
}

impl PaperSpec {
    /// Orientation-adjusted page size in pixels.
    pub fn page_size(&self) -> (f64, f64) {
        let (w, h) = self.format.size();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    /// Vertical space available for content on one page.
    pub fn content_height(&self) -> f64 {
        let (_, h) = self.page_size();
        h - self.margin.top - self.margin.bottom
    }
}
