use serde::{Deserialize, Serialize};

/// Axis-aligned box in page coordinates, y increasing downward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        BBox { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }

    /// Finite coordinates and no inverted axis.
    pub fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x0 <= self.x1
            && self.y0 <= self.y1
    }

    /// Inclusive point containment.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn contains(&self, other: &BBox) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1 && other.y0 >= self.y0 && other.y1 <= self.y1
    }

    pub fn intersection(&self, other: &BBox) -> Option<BBox> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x0 < x1 && y0 < y1 {
            Some(BBox { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Intersection area divided by the smaller of the two areas.
    ///
    /// A table nested inside a larger detection of the same table scores 1.0.
    pub fn overlap_ratio(&self, other: &BBox) -> f32 {
        let smaller = self.area().min(other.area());
        if smaller <= 0.0 {
            return 0.0;
        }
        self.intersection(other)
            .map(|i| i.area() / smaller)
            .unwrap_or(0.0)
    }

    /// Smallest box enclosing every box in the iterator.
    pub fn enclosing<'a, I>(boxes: I) -> Option<BBox>
    where
        I: IntoIterator<Item = &'a BBox>,
    {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BBox>, b| match acc {
                Some(a) => Some(a.union(b)),
                None => Some(*b),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A positioned piece of text as produced by the page parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub bbox: BBox,
    /// Only used as a tie-break signal.
    #[serde(default)]
    pub font_size: f32,
}

impl Token {
    pub fn new(text: impl Into<String>, bbox: BBox) -> Self {
        let bbox_height = bbox.height();
        Token {
            text: text.into(),
            bbox,
            font_size: bbox_height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A drawn line from the page's vector graphics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
    /// Stroke width hint.
    #[serde(default)]
    pub width: f32,
}

impl LineSegment {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        LineSegment {
            start: Point { x: x0, y: y0 },
            end: Point { x: x1, y: y1 },
            width: 1.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.start.x, self.start.y, self.end.x, self.end.y]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn dx(&self) -> f32 {
        (self.end.x - self.start.x).abs()
    }

    pub fn dy(&self) -> f32 {
        (self.end.y - self.start.y).abs()
    }

    pub fn length(&self) -> f32 {
        self.dx().hypot(self.dy())
    }

    /// Classify by the dominant axis. Returns `None` for diagonal strokes,
    /// i.e. when the minor-axis delta exceeds `tolerance`.
    pub fn orientation(&self, tolerance: f32) -> Option<Orientation> {
        let (dx, dy) = (self.dx(), self.dy());
        if dx >= dy && dy <= tolerance {
            Some(Orientation::Horizontal)
        } else if dy > dx && dx <= tolerance {
            Some(Orientation::Vertical)
        } else {
            None
        }
    }

    /// Position across the line: mean y for horizontal, mean x for vertical.
    pub fn position(&self, orientation: Orientation) -> f32 {
        match orientation {
            Orientation::Horizontal => (self.start.y + self.end.y) / 2.0,
            Orientation::Vertical => (self.start.x + self.end.x) / 2.0,
        }
    }

    /// `(min, max)` extent along the line.
    pub fn span(&self, orientation: Orientation) -> (f32, f32) {
        match orientation {
            Orientation::Horizontal => (
                self.start.x.min(self.end.x),
                self.start.x.max(self.end.x),
            ),
            Orientation::Vertical => (
                self.start.y.min(self.end.y),
                self.start.y.max(self.end.y),
            ),
        }
    }
}

/// All primitives of one page, as handed over by the page parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInput {
    #[serde(default)]
    pub page_number: usize,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub segments: Vec<LineSegment>,
}

/// Page primitives with malformed entries removed.
#[derive(Debug, Clone, Default)]
pub struct CleanPage {
    pub page_number: usize,
    pub width: f32,
    pub height: f32,
    pub tokens: Vec<Token>,
    pub segments: Vec<LineSegment>,
    pub malformed_tokens: usize,
    pub malformed_segments: usize,
}

impl CleanPage {
    /// Drop tokens with blank text or non-finite/inverted boxes, and
    /// segments with non-finite endpoints. Never fails; drops are counted.
    pub fn from_input(page: &PageInput) -> Self {
        let mut malformed_tokens = 0;
        let tokens: Vec<Token> = page
            .tokens
            .iter()
            .filter_map(|t| {
                let text = t.text.trim();
                if text.is_empty() || !t.bbox.is_valid() {
                    malformed_tokens += 1;
                    return None;
                }
                Some(Token {
                    text: text.to_string(),
                    bbox: t.bbox,
                    font_size: if t.font_size.is_finite() && t.font_size > 0.0 {
                        t.font_size
                    } else {
                        t.bbox.height()
                    },
                })
            })
            .collect();

        let mut malformed_segments = 0;
        let segments: Vec<LineSegment> = page
            .segments
            .iter()
            .filter(|s| {
                let ok = s.is_valid();
                if !ok {
                    malformed_segments += 1;
                }
                ok
            })
            .copied()
            .collect();

        CleanPage {
            page_number: page.page_number,
            width: page.width,
            height: page.height,
            tokens,
            segments,
            malformed_tokens,
            malformed_segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_validity() {
        assert!(BBox::new(0.0, 0.0, 10.0, 5.0).is_valid());
        assert!(!BBox::new(10.0, 0.0, 0.0, 5.0).is_valid());
        assert!(!BBox::new(0.0, f32::NAN, 10.0, 5.0).is_valid());
        assert!(!BBox::new(0.0, 0.0, f32::INFINITY, 5.0).is_valid());
    }

    #[test]
    fn test_overlap_ratio_uses_smaller_area() {
        let big = BBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BBox::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(big.overlap_ratio(&inner), 1.0);

        let half = BBox::new(50.0, 0.0, 150.0, 100.0);
        assert!((big.overlap_ratio(&half) - 0.5).abs() < 1e-6);

        let apart = BBox::new(200.0, 200.0, 210.0, 210.0);
        assert_eq!(big.overlap_ratio(&apart), 0.0);
    }

    #[test]
    fn test_segment_orientation() {
        assert_eq!(
            LineSegment::new(0.0, 10.0, 100.0, 10.5).orientation(1.0),
            Some(Orientation::Horizontal)
        );
        assert_eq!(
            LineSegment::new(5.0, 0.0, 5.0, 80.0).orientation(1.0),
            Some(Orientation::Vertical)
        );
        assert_eq!(LineSegment::new(0.0, 0.0, 50.0, 50.0).orientation(1.0), None);
    }

    #[test]
    fn test_clean_page_counts_malformed() {
        let page = PageInput {
            page_number: 1,
            width: 600.0,
            height: 800.0,
            tokens: vec![
                Token::new("ok", BBox::new(0.0, 0.0, 10.0, 10.0)),
                Token::new("   ", BBox::new(0.0, 0.0, 10.0, 10.0)),
                Token::new("inverted", BBox::new(10.0, 0.0, 0.0, 10.0)),
            ],
            segments: vec![
                LineSegment::new(0.0, 0.0, 10.0, 0.0),
                LineSegment::new(f32::NAN, 0.0, 10.0, 0.0),
            ],
        };
        let clean = CleanPage::from_input(&page);
        assert_eq!(clean.tokens.len(), 1);
        assert_eq!(clean.malformed_tokens, 2);
        assert_eq!(clean.segments.len(), 1);
        assert_eq!(clean.malformed_segments, 1);
    }

    #[test]
    fn test_enclosing() {
        let boxes = [BBox::new(0.0, 5.0, 10.0, 10.0), BBox::new(5.0, 0.0, 20.0, 8.0)];
        assert_eq!(
            BBox::enclosing(boxes.iter()),
            Some(BBox::new(0.0, 0.0, 20.0, 10.0))
        );
        assert_eq!(BBox::enclosing(std::iter::empty::<&BBox>()), None);
    }
}
