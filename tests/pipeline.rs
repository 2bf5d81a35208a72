//! End-to-end tests for the stage pipeline, driven by a deterministic
//! scripted engine.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::RgbImage;

use pageflow::core::errors::{PipelineError, PipelineResult};
use pageflow::core::traits::LayoutEngine;
use pageflow::domain::hypotheses::{
    CharFilter, OrientationHypothesis, RecognizedSpan, RegionDetectionOptions, RegionHypothesis,
};
use pageflow::domain::tree::{
    Document, ImageRef, LineAttrs, NodeData, NodeId, PageAttrs, RegionAttrs, RegionKind, WordAttrs,
};
use pageflow::domain::Level;
use pageflow::pipeline::config::{
    BinarizeConfig, CropConfig, DeskewConfig, RecognizeConfig, SegmentLineConfig,
    SegmentRegionConfig, SegmentTableConfig, SegmentWordConfig, TextEquivLevel,
};
use pageflow::pipeline::stages::{
    BinarizeStage, CropStage, DeskewStage, RecognizeStage, SegmentLineStage, SegmentRegionStage,
    SegmentTableStage, SegmentWordStage, SkipReason, StageContext, StageProcessor,
};
use pageflow::pipeline::{ImageStore, PipelineDriver, StageSpec, Workflow, WorkflowStep};
use pageflow::processors::geometry::{BoundingBox, Geometry};
use pageflow::storage::{DirectoryStorage, Storage};

/// Engine returning scripted hypotheses, with per-method call counters.
struct ScriptedEngine {
    orientation: OrientationHypothesis,
    border: BoundingBox,
    threshold: u8,
    regions: Vec<RegionHypothesis>,
    cells: Vec<Geometry>,
    lines: Vec<Geometry>,
    words: Vec<Geometry>,
    text: String,
    needs_dpi: bool,
    fail_detection: bool,
    recognize_calls: AtomicUsize,
    detect_word_calls: AtomicUsize,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            orientation: OrientationHypothesis {
                orientation_deg: 0,
                skew_deg: 0.0,
                script: None,
                confidence: 10.0,
            },
            border: BoundingBox::new(0.0, 0.0, 200.0, 100.0),
            threshold: 128,
            regions: vec![RegionHypothesis {
                geometry: Geometry::Rect(BoundingBox::new(10.0, 10.0, 190.0, 90.0)),
                kind: RegionKind::Text,
            }],
            cells: Vec::new(),
            lines: vec![Geometry::Rect(BoundingBox::new(0.0, 0.0, 170.0, 30.0))],
            words: vec![
                Geometry::Rect(BoundingBox::new(0.0, 0.0, 60.0, 30.0)),
                Geometry::Rect(BoundingBox::new(70.0, 0.0, 160.0, 30.0)),
            ],
            text: "lorem".to_string(),
            needs_dpi: false,
            fail_detection: false,
            recognize_calls: AtomicUsize::new(0),
            detect_word_calls: AtomicUsize::new(0),
        }
    }
}

impl ScriptedEngine {
    fn fail(&self) -> PipelineError {
        PipelineError::detection_msg("scripted failure")
    }
}

impl LayoutEngine for ScriptedEngine {
    fn detect_orientation(
        &self,
        _image: &RgbImage,
        _dpi: Option<f32>,
    ) -> PipelineResult<OrientationHypothesis> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.orientation.clone())
    }

    fn detect_border(&self, _image: &RgbImage) -> PipelineResult<BoundingBox> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.border)
    }

    fn binarize_threshold(&self, _image: &RgbImage) -> PipelineResult<u8> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.threshold)
    }

    fn detect_regions(
        &self,
        _image: &RgbImage,
        _opts: &RegionDetectionOptions,
    ) -> PipelineResult<Vec<RegionHypothesis>> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.regions.clone())
    }

    fn detect_table_cells(&self, _image: &RgbImage) -> PipelineResult<Vec<Geometry>> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.cells.clone())
    }

    fn detect_lines(&self, _image: &RgbImage) -> PipelineResult<Vec<Geometry>> {
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.lines.clone())
    }

    fn detect_words(&self, _image: &RgbImage) -> PipelineResult<Vec<Geometry>> {
        self.detect_word_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(self.words.clone())
    }

    fn recognize(
        &self,
        _image: &RgbImage,
        _model: Option<&str>,
        filter: &CharFilter,
    ) -> PipelineResult<Vec<RecognizedSpan>> {
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_detection {
            return Err(self.fail());
        }
        Ok(vec![RecognizedSpan {
            geometry: None,
            text: filter.filter_text(&self.text),
            confidence: 0.9,
        }])
    }

    fn needs_dpi(&self) -> bool {
        self.needs_dpi
    }
}

fn page_with_image(doc: &mut Document, images: &mut ImageStore) -> NodeId {
    let reference = ImageRef::new("page.png");
    images.insert(reference.clone(), RgbImage::new(200, 100));
    doc.add_page(PageAttrs::new(reference, 200, 100))
}

fn attach_text_region(doc: &mut Document, page: NodeId) -> NodeId {
    doc.attach_children(
        page,
        vec![NodeData::Region(RegionAttrs::new(
            Geometry::Rect(BoundingBox::new(10.0, 10.0, 190.0, 90.0)),
            RegionKind::Text,
        ))],
    )
    .unwrap()[0]
}

#[test]
fn segment_line_without_overwrite_is_idempotent() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    attach_text_region(&mut doc, page);

    let config = SegmentLineConfig {
        overwrite_lines: false,
    };
    let report = SegmentLineStage
        .run(&mut StageContext::new(&mut doc, &mut images, &engine), &config)
        .unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(doc.nodes_at_level(Level::Line).len(), 1);

    let before = doc.clone();
    let report = SegmentLineStage
        .run(&mut StageContext::new(&mut doc, &mut images, &engine), &config)
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::AlreadySegmented(Level::Line)
    ));
    assert_eq!(doc, before, "second run must be a no-op");
}

#[test]
fn segment_region_overwrite_removes_deep_structure() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    let region = attach_text_region(&mut doc, page);
    let line = doc
        .attach_children(
            region,
            vec![NodeData::Line(LineAttrs::new(Geometry::Rect(
                BoundingBox::new(10.0, 10.0, 180.0, 40.0),
            )))],
        )
        .unwrap()[0];
    doc.attach_children(
        line,
        vec![NodeData::Word(WordAttrs::new(Geometry::Rect(
            BoundingBox::new(10.0, 10.0, 60.0, 40.0),
        )))],
    )
    .unwrap();

    let report = SegmentRegionStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentRegionConfig::default(),
        )
        .unwrap();
    assert_eq!(report.success_count, 1);

    // old structure is gone entirely, only the fresh region remains
    assert!(doc.get(region).is_none());
    assert!(doc.get(line).is_none());
    assert_eq!(doc.nodes_at_level(Level::Region).len(), 1);
    assert!(doc.nodes_at_level(Level::Line).is_empty());
    assert!(doc.nodes_at_level(Level::Word).is_empty());
}

#[test]
fn deskew_confidence_gating_still_records_skew() {
    let engine = ScriptedEngine {
        orientation: OrientationHypothesis {
            orientation_deg: 180,
            skew_deg: 1.7,
            script: Some("Latin".to_string()),
            confidence: 1.2,
        },
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);

    let config = DeskewConfig {
        min_orientation_confidence: 1.5,
        ..Default::default()
    };
    DeskewStage
        .run(&mut StageContext::new(&mut doc, &mut images, &engine), &config)
        .unwrap();

    let NodeData::Page(attrs) = &doc.node(page).unwrap().data else {
        panic!("expected page");
    };
    assert_eq!(attrs.orientation, 0, "low confidence must not rotate");
    assert!((attrs.skew - 1.7).abs() < 1e-6, "skew is always recorded");
    assert_eq!(attrs.script.as_deref(), Some("Latin"));
}

#[test]
fn deskew_applies_confident_orientation() {
    let engine = ScriptedEngine {
        orientation: OrientationHypothesis {
            orientation_deg: 180,
            skew_deg: 0.3,
            script: None,
            confidence: 9.0,
        },
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);

    DeskewStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &DeskewConfig::default(),
        )
        .unwrap();

    let NodeData::Page(attrs) = &doc.node(page).unwrap().data else {
        panic!("expected page");
    };
    assert_eq!(attrs.orientation, 180);
}

#[test]
fn recognize_word_level_end_to_end() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    if let NodeData::Page(attrs) = doc.data_mut(page).unwrap() {
        attrs.dpi = Some(300.0);
    }
    attach_text_region(&mut doc, page);

    SegmentLineStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentLineConfig::default(),
        )
        .unwrap();
    SegmentWordStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentWordConfig::default(),
        )
        .unwrap();
    RecognizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &RecognizeConfig {
                textequiv_level: TextEquivLevel::Word,
                ..Default::default()
            },
        )
        .unwrap();

    let words = doc.nodes_at_level(Level::Word);
    assert_eq!(words.len(), 2);
    for word in &words {
        assert_eq!(doc.primary_text(*word), Some("lorem"));
    }

    // line text is the space-joined word texts
    let lines = doc.nodes_at_level(Level::Line);
    assert_eq!(lines.len(), 1);
    assert_eq!(doc.primary_text(lines[0]), Some("lorem lorem"));

    // no glyph annotation was produced
    assert!(doc.nodes_at_level(Level::Glyph).is_empty());
}

#[test]
fn recognize_raw_lines_single_call_per_line() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    let region = attach_text_region(&mut doc, page);
    let line = doc
        .attach_children(
            region,
            vec![NodeData::Line(LineAttrs::new(Geometry::Rect(
                BoundingBox::new(10.0, 10.0, 180.0, 40.0),
            )))],
        )
        .unwrap()[0];

    RecognizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &RecognizeConfig {
                textequiv_level: TextEquivLevel::Line,
                raw_lines: true,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(engine.recognize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.detect_word_calls.load(Ordering::SeqCst), 0);
    assert_eq!(doc.primary_text(line), Some("lorem"));
    assert!(doc.nodes_at_level(Level::Word).is_empty());
    assert!(doc.nodes_at_level(Level::Glyph).is_empty());
}

#[test]
fn recognize_glyph_level_creates_glyphs_with_alternatives_slot() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    attach_text_region(&mut doc, page);

    RecognizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &RecognizeConfig {
                textequiv_level: TextEquivLevel::Glyph,
                ..Default::default()
            },
        )
        .unwrap();

    // implicit line and word segmentation ran
    assert_eq!(doc.nodes_at_level(Level::Line).len(), 1);
    assert_eq!(doc.nodes_at_level(Level::Word).len(), 2);
    let glyphs = doc.nodes_at_level(Level::Glyph);
    assert!(!glyphs.is_empty());
    for glyph in &glyphs {
        assert!(doc.primary_text(*glyph).is_some());
    }
}

#[test]
fn recognize_respects_char_filter() {
    let engine = ScriptedEngine {
        text: "abc".to_string(),
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    let region = attach_text_region(&mut doc, page);

    RecognizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &RecognizeConfig {
                textequiv_level: TextEquivLevel::Region,
                char_blacklist: Some("b".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(doc.primary_text(region), Some("ac"));
}

#[test]
fn missing_dpi_skips_node_when_engine_requires_it() {
    let engine = ScriptedEngine {
        needs_dpi: true,
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    attach_text_region(&mut doc, page);

    // no page DPI, no override: the region is skipped
    let report = BinarizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &BinarizeConfig::default(),
        )
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::MissingDpi(_)
    ));

    // an explicit override unblocks it
    let report = BinarizeStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &BinarizeConfig {
                dpi: 300.0,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.success_count, 1);
    assert!(doc.nodes_at_level(Level::Page).len() == 1);
}

#[test]
fn detection_failure_is_recorded_not_fatal() {
    let engine = ScriptedEngine {
        fail_detection: true,
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    attach_text_region(&mut doc, page);

    let report = SegmentLineStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentLineConfig::default(),
        )
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert_eq!(report.failure_count(), 1);
    assert!(matches!(report.skipped[0].reason, SkipReason::Detection(_)));
    assert_eq!(doc.nodes_at_level(Level::Page), vec![page]);
}

#[test]
fn empty_selection_is_a_noop() {
    let engine = ScriptedEngine::default();
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    page_with_image(&mut doc, &mut images);

    // no regions exist, so segment-line has nothing to do
    let report = SegmentLineStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentLineConfig::default(),
        )
        .unwrap();
    assert_eq!(report.total_count(), 0);
}

#[test]
fn crop_sets_padded_page_border() {
    let engine = ScriptedEngine {
        border: BoundingBox::new(10.0, 10.0, 190.0, 90.0),
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);

    let report = CropStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &CropConfig {
                padding: 4,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(report.success_count, 1);

    let NodeData::Page(attrs) = &doc.node(page).unwrap().data else {
        panic!("expected page");
    };
    assert_eq!(attrs.border, Some(BoundingBox::new(6.0, 6.0, 194.0, 94.0)));
    // no regions were created
    assert!(doc.nodes_at_level(Level::Region).is_empty());
}

#[test]
fn segment_table_splits_tables_into_cells() {
    let engine = ScriptedEngine {
        cells: vec![
            Geometry::Rect(BoundingBox::new(0.0, 0.0, 80.0, 70.0)),
            Geometry::Rect(BoundingBox::new(90.0, 0.0, 170.0, 70.0)),
        ],
        ..Default::default()
    };
    let mut doc = Document::new();
    let mut images = ImageStore::new();
    let page = page_with_image(&mut doc, &mut images);
    let table = doc
        .attach_children(
            page,
            vec![NodeData::Region(RegionAttrs::new(
                Geometry::Rect(BoundingBox::new(10.0, 10.0, 190.0, 90.0)),
                RegionKind::Table,
            ))],
        )
        .unwrap()[0];

    let report = SegmentTableStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentTableConfig::default(),
        )
        .unwrap();
    assert_eq!(report.success_count, 1);

    // cells are child regions of the table, scoped to its subtree
    let children = doc.node(table).unwrap().children.clone();
    assert_eq!(children.len(), 2);
    for cell in &children {
        match &doc.node(*cell).unwrap().data {
            NodeData::Region(attrs) => assert!(attrs.kind.is_text()),
            _ => panic!("cells must be regions"),
        }
    }

    // rerun without overwrite skips the already segmented table
    let report = SegmentTableStage
        .run(
            &mut StageContext::new(&mut doc, &mut images, &engine),
            &SegmentTableConfig {
                overwrite_cells: false,
            },
        )
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::AlreadySegmented(Level::Region)
    ));
}

#[test]
fn driver_runs_workflow_against_storage() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DirectoryStorage::new(dir.path().join("annotations"));
    let engine = ScriptedEngine::default();

    // seed the workspace: a page image on disk plus an unsegmented tree
    let image_path = dir.path().join("page.png");
    image::DynamicImage::ImageRgb8(RgbImage::new(200, 100))
        .save(&image_path)
        .unwrap();
    let mut doc = Document::new();
    doc.add_page(PageAttrs::new(ImageRef::new("page.png"), 200, 100));
    storage.store("OCR-D-IMG", &doc).unwrap();

    let workflow = Workflow::new(vec![
        WorkflowStep {
            input: "OCR-D-IMG".into(),
            output: "OCR-D-SEG-REGION".into(),
            stage: StageSpec::SegmentRegion(SegmentRegionConfig::default()),
        },
        WorkflowStep {
            input: "OCR-D-SEG-REGION".into(),
            output: "OCR-D-SEG-LINE".into(),
            stage: StageSpec::SegmentLine(SegmentLineConfig::default()),
        },
    ]);

    let driver = PipelineDriver::new(&storage, &engine).with_image_root(dir.path());
    let report = driver.run(&workflow).unwrap();
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.skipped_count(), 0);

    let result = storage.load("OCR-D-SEG-LINE").unwrap();
    assert_eq!(result.nodes_at_level(Level::Region).len(), 1);
    assert_eq!(result.nodes_at_level(Level::Line).len(), 1);
}

#[test]
fn driver_rejects_invalid_parameters_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let storage = DirectoryStorage::new(dir.path().join("annotations"));
    let engine = ScriptedEngine::default();

    let mut doc = Document::new();
    doc.add_page(PageAttrs::new(ImageRef::new("page.png"), 200, 100));
    storage.store("IN", &doc).unwrap();

    let workflow = Workflow::new(vec![
        WorkflowStep {
            input: "IN".into(),
            output: "MID".into(),
            stage: StageSpec::SegmentRegion(SegmentRegionConfig::default()),
        },
        WorkflowStep {
            input: "MID".into(),
            output: "OUT".into(),
            stage: StageSpec::Deskew(DeskewConfig {
                min_orientation_confidence: -1.0,
                ..Default::default()
            }),
        },
    ]);

    let driver = PipelineDriver::new(&storage, &engine).with_image_root(dir.path());
    let err = driver.run(&workflow).unwrap_err();
    assert!(matches!(err, PipelineError::Parameter { .. }));
    // nothing was stored: the bad parameter aborted before any processing
    assert!(storage.load("MID").is_err());
    assert!(storage.load("OUT").is_err());
}
