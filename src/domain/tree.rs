//! The hierarchical document annotation tree.
//!
//! A [`Document`] owns an index-based arena of nodes: pages own regions,
//! regions own lines (or, for table regions, cell regions), lines own
//! words, words own glyphs. The arena avoids parent/child ownership
//! cycles and keeps node handles stable across mutations; detached
//! subtrees leave tombstone slots behind.
//!
//! Structural invariants enforced on every mutation:
//! - every non-root node has exactly one parent (no orphans, no sharing);
//! - a child's geometry must overlap its parent's bounds non-trivially;
//! - the child kind must be legal for the parent (table regions own
//!   regions, text regions own lines).

use serde::{Deserialize, Serialize};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::domain::level::Level;
use crate::processors::geometry::{BoundingBox, Geometry, Point};

/// Stable handle of a node in the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Reference to an image buffer held by the per-run image store.
///
/// Page images refer to their source file; derived images (binarized
/// subimages) use synthetic references minted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Mints a reference for an image derived from this one.
    pub fn derived(&self, suffix: &str) -> ImageRef {
        ImageRef(format!("{}#{}", self.0, suffix))
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ranked textual annotation on a tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEquiv {
    /// The recognized text.
    pub text: String,
    /// Recognition confidence, when the engine reported one.
    pub confidence: Option<f32>,
    /// Rank among alternatives; 0 is the primary reading.
    pub index: u32,
}

impl TextEquiv {
    /// Creates a primary (index 0) text annotation.
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
            index: 0,
        }
    }

    /// Creates a ranked alternative reading.
    pub fn alternative(text: impl Into<String>, confidence: Option<f32>, index: u32) -> Self {
        Self {
            text: text.into(),
            confidence,
            index,
        }
    }
}

/// The semantic type of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Text,
    Table,
    Image,
    Separator,
    Other,
}

impl RegionKind {
    /// Regions that carry recognizable text lines.
    pub fn is_text(&self) -> bool {
        matches!(self, RegionKind::Text)
    }

    /// Regions whose children are cell regions instead of lines.
    pub fn is_table(&self) -> bool {
        matches!(self, RegionKind::Table)
    }
}

/// Page attributes: the image reference plus resolution, orientation and
/// working-rectangle annotations written by the early stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageAttrs {
    /// Reference to the page raster image.
    pub image: ImageRef,
    /// Page image width in pixels.
    pub width: u32,
    /// Page image height in pixels.
    pub height: u32,
    /// Pixel density from image metadata, when known.
    pub dpi: Option<f32>,
    /// Applied orientation correction in degrees (0, 90, 180 or 270).
    pub orientation: i32,
    /// Detected skew angle in degrees.
    pub skew: f32,
    /// Detected dominant script.
    pub script: Option<String>,
    /// Working rectangle set by the crop stage; None means the full image.
    pub border: Option<BoundingBox>,
}

impl PageAttrs {
    pub fn new(image: ImageRef, width: u32, height: u32) -> Self {
        Self {
            image,
            width,
            height,
            dpi: None,
            orientation: 0,
            skew: 0.0,
            script: None,
            border: None,
        }
    }

    /// The page's effective bounds: the border when one is set, the full
    /// image rectangle otherwise.
    pub fn bounds(&self) -> BoundingBox {
        self.border
            .unwrap_or_else(|| BoundingBox::new(0.0, 0.0, self.width as f32, self.height as f32))
    }
}

/// Region attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAttrs {
    pub geometry: Geometry,
    pub kind: RegionKind,
    /// Assigned position among siblings in reading sequence.
    pub reading_order: u32,
    /// Applied orientation correction in degrees.
    pub orientation: i32,
    /// Detected skew angle in degrees.
    pub skew: f32,
    /// Detected dominant script.
    pub script: Option<String>,
    pub text: Vec<TextEquiv>,
    pub binarized: Option<ImageRef>,
}

impl RegionAttrs {
    pub fn new(geometry: Geometry, kind: RegionKind) -> Self {
        Self {
            geometry,
            kind,
            reading_order: 0,
            orientation: 0,
            skew: 0.0,
            script: None,
            text: Vec::new(),
            binarized: None,
        }
    }
}

/// Text line attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineAttrs {
    pub geometry: Geometry,
    /// Baseline points in page coordinates, when detected.
    pub baseline: Option<Vec<Point>>,
    pub text: Vec<TextEquiv>,
    pub binarized: Option<ImageRef>,
}

impl LineAttrs {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            baseline: None,
            text: Vec::new(),
            binarized: None,
        }
    }
}

/// Word attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordAttrs {
    pub geometry: Geometry,
    pub text: Vec<TextEquiv>,
}

impl WordAttrs {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            text: Vec::new(),
        }
    }
}

/// Glyph attributes. Ranked character alternatives are stored as
/// additional [`TextEquiv`] entries with increasing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlyphAttrs {
    pub geometry: Geometry,
    pub text: Vec<TextEquiv>,
}

impl GlyphAttrs {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            text: Vec::new(),
        }
    }
}

/// Payload of a tree node, tagged by hierarchy level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeData {
    Page(PageAttrs),
    Region(RegionAttrs),
    Line(LineAttrs),
    Word(WordAttrs),
    Glyph(GlyphAttrs),
}

impl NodeData {
    /// The hierarchy level of this payload.
    pub fn level(&self) -> Level {
        match self {
            NodeData::Page(_) => Level::Page,
            NodeData::Region(_) => Level::Region,
            NodeData::Line(_) => Level::Line,
            NodeData::Word(_) => Level::Word,
            NodeData::Glyph(_) => Level::Glyph,
        }
    }

    /// The node geometry; pages have bounds instead (see
    /// [`Document::node_bounds`]).
    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            NodeData::Page(_) => None,
            NodeData::Region(attrs) => Some(&attrs.geometry),
            NodeData::Line(attrs) => Some(&attrs.geometry),
            NodeData::Word(attrs) => Some(&attrs.geometry),
            NodeData::Glyph(attrs) => Some(&attrs.geometry),
        }
    }

    /// The text annotations of this node, empty for pages.
    pub fn text_equivs(&self) -> &[TextEquiv] {
        match self {
            NodeData::Page(_) => &[],
            NodeData::Region(attrs) => &attrs.text,
            NodeData::Line(attrs) => &attrs.text,
            NodeData::Word(attrs) => &attrs.text,
            NodeData::Glyph(attrs) => &attrs.text,
        }
    }
}

/// A node in the document arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    /// Children in reading order.
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

/// The root of the annotation hierarchy: an arena of nodes plus the
/// externally assigned page sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    slots: Vec<Option<Node>>,
    pages: Vec<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a page. Page order is externally assigned and never
    /// recomputed.
    pub fn add_page(&mut self, attrs: PageAttrs) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Some(Node {
            id,
            parent: None,
            children: Vec::new(),
            data: NodeData::Page(attrs),
        }));
        self.pages.push(id);
        id
    }

    /// The page sequence.
    pub fn pages(&self) -> &[NodeId] {
        &self.pages
    }

    /// Looks a node up, returning None for unknown or detached ids.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Looks a node up, failing with a structural error for detached ids.
    pub fn node(&self, id: NodeId) -> PipelineResult<&Node> {
        self.get(id)
            .ok_or_else(|| PipelineError::structural(format!("node {} does not exist", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> PipelineResult<&mut Node> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| PipelineError::structural(format!("node {} does not exist", id)))
    }

    /// The hierarchy level of a node.
    pub fn level(&self, id: NodeId) -> PipelineResult<Level> {
        Ok(self.node(id)?.data.level())
    }

    /// Walks up to the page owning `id`.
    pub fn page_of(&self, id: NodeId) -> PipelineResult<NodeId> {
        let mut current = id;
        loop {
            let node = self.node(current)?;
            match node.parent {
                None => {
                    return if node.data.level() == Level::Page {
                        Ok(current)
                    } else {
                        Err(PipelineError::structural(format!(
                            "node {} has no owning page",
                            id
                        )))
                    };
                }
                Some(parent) => current = parent,
            }
        }
    }

    /// The effective bounds of a node in page coordinates: the page
    /// border (or full image) for pages, the geometry envelope otherwise.
    pub fn node_bounds(&self, id: NodeId) -> PipelineResult<BoundingBox> {
        let node = self.node(id)?;
        match &node.data {
            NodeData::Page(attrs) => Ok(attrs.bounds()),
            data => Ok(data
                .geometry()
                .expect("non-page nodes carry geometry")
                .bbox()),
        }
    }

    /// Collects the nodes at `level` in document order (depth-first,
    /// left-to-right across the page sequence).
    ///
    /// Cell regions nested in table regions are included for
    /// `Level::Region`, after their owning table.
    pub fn nodes_at_level(&self, level: Level) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &page in &self.pages {
            self.collect_at_level(page, level, &mut out);
        }
        out
    }

    fn collect_at_level(&self, id: NodeId, level: Level, out: &mut Vec<NodeId>) {
        let Some(node) = self.get(id) else {
            return;
        };
        if node.data.level() == level {
            out.push(id);
        }
        if node.data.level() <= level {
            for &child in &node.children {
                self.collect_at_level(child, level, out);
            }
        }
    }

    /// True if the node has any children.
    pub fn has_children(&self, id: NodeId) -> bool {
        self.get(id).map(|n| !n.children.is_empty()).unwrap_or(false)
    }

    /// Attaches new children to `parent`, taking ownership and assigning
    /// sequential reading-order indices after any existing children.
    ///
    /// Fails with a structural error when a child kind is illegal for the
    /// parent or a child geometry does not overlap the parent bounds.
    pub fn attach_children(
        &mut self,
        parent: NodeId,
        children: Vec<NodeData>,
    ) -> PipelineResult<Vec<NodeId>> {
        let parent_bounds = self.node_bounds(parent)?;
        let parent_node = self.node(parent)?;
        let parent_level = parent_node.data.level();
        let parent_is_table = matches!(
            &parent_node.data,
            NodeData::Region(attrs) if attrs.kind.is_table()
        );
        let order_base = parent_node.children.len() as u32;

        for child in &children {
            let expected = match (&parent_node.data, parent_is_table) {
                (NodeData::Page(_), _) => Level::Region,
                (NodeData::Region(_), true) => Level::Region,
                (NodeData::Region(_), false) => Level::Line,
                (NodeData::Line(_), _) => Level::Word,
                (NodeData::Word(_), _) => Level::Glyph,
                (NodeData::Glyph(_), _) => {
                    return Err(PipelineError::structural("glyphs cannot own children"));
                }
            };
            if child.level() != expected {
                return Err(PipelineError::structural(format!(
                    "cannot attach {} node to {} parent {}",
                    child.level(),
                    parent_level,
                    parent
                )));
            }

            let child_bbox = child
                .geometry()
                .expect("attached children carry geometry")
                .bbox();
            if child_bbox.intersection(&parent_bounds).is_none() {
                return Err(PipelineError::structural(format!(
                    "child geometry {:?} does not overlap parent {} bounds {:?}",
                    child_bbox, parent, parent_bounds
                )));
            }
        }

        let mut ids = Vec::with_capacity(children.len());
        for (offset, mut data) in children.into_iter().enumerate() {
            if let NodeData::Region(attrs) = &mut data {
                attrs.reading_order = order_base + offset as u32;
            }
            let id = NodeId(self.slots.len() as u32);
            self.slots.push(Some(Node {
                id,
                parent: Some(parent),
                children: Vec::new(),
                data,
            }));
            ids.push(id);
        }
        self.node_mut(parent)?.children.extend(ids.iter().copied());
        Ok(ids)
    }

    /// Detaches and discards the entire subtree below `parent`, returning
    /// the removed node ids.
    pub fn detach_children(&mut self, parent: NodeId) -> PipelineResult<Vec<NodeId>> {
        let children = std::mem::take(&mut self.node_mut(parent)?.children);
        let mut removed = Vec::new();
        for child in children {
            self.remove_subtree(child, &mut removed);
        }
        Ok(removed)
    }

    fn remove_subtree(&mut self, id: NodeId, removed: &mut Vec<NodeId>) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            if let Some(node) = slot.take() {
                removed.push(id);
                for child in node.children {
                    self.remove_subtree(child, removed);
                }
            }
        }
    }

    /// Mutable access to a node's payload.
    pub fn data_mut(&mut self, id: NodeId) -> PipelineResult<&mut NodeData> {
        Ok(&mut self.node_mut(id)?.data)
    }

    /// Replaces the primary text annotation of a node.
    pub fn set_primary_text(&mut self, id: NodeId, equiv: TextEquiv) -> PipelineResult<()> {
        let text = self.text_equivs_mut(id)?;
        text.retain(|t| t.index != equiv.index);
        text.push(equiv);
        text.sort_by_key(|t| t.index);
        Ok(())
    }

    /// Appends a ranked text annotation to a node.
    pub fn push_text(&mut self, id: NodeId, equiv: TextEquiv) -> PipelineResult<()> {
        self.text_equivs_mut(id)?.push(equiv);
        Ok(())
    }

    fn text_equivs_mut(&mut self, id: NodeId) -> PipelineResult<&mut Vec<TextEquiv>> {
        match self.data_mut(id)? {
            NodeData::Page(_) => Err(PipelineError::structural(format!(
                "page {} cannot carry text annotations",
                id
            ))),
            NodeData::Region(attrs) => Ok(&mut attrs.text),
            NodeData::Line(attrs) => Ok(&mut attrs.text),
            NodeData::Word(attrs) => Ok(&mut attrs.text),
            NodeData::Glyph(attrs) => Ok(&mut attrs.text),
        }
    }

    /// The primary text of a node, when one is annotated.
    pub fn primary_text(&self, id: NodeId) -> Option<&str> {
        self.get(id)?
            .data
            .text_equivs()
            .iter()
            .find(|t| t.index == 0)
            .map(|t| t.text.as_str())
    }
}
