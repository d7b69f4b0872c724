use serde::Serialize;

use crate::classify::{PhaseClassifier, PhaseClassifierAdapter, PhaseLabels};
use crate::config::{Config, ScoringConfig};
use crate::error::AnalysisError;
use crate::features::{FeatureExtractor, FeatureVector, PhaseAggregate, PhaseAggregator};
use crate::pose::crop::{remap_pose, CropRegion, RegionTracker};
use crate::pose::estimator::{estimate_full_frame, PoseEstimator};
use crate::pose::keypoint::Pose;
use crate::pose::preprocess::RgbFrame;
use crate::pose::signal::SignalBuilder;
use crate::scoring::{
    compute_deviations, overall_score, FeatureDeviation, PhaseScore, QualityScorer,
    ReferenceProfile,
};
use crate::swing::{
    CompletionReason, ContactDetector, PeakWristSpeedDetector, PhaseMap, SegmentEvent,
    SegmenterStats, Swing, SwingPhase, SwingSegmenter,
};

/// 1動画分のフレーム処理
///
/// クロップ領域、直前2フレーム、スイングバッファを持ち回るので、
/// フレームは時系列順に1枚ずつ投入すること。動画ごとに別インスタンスを使う。
pub struct VideoAnalyzer {
    tracker: RegionTracker,
    signal: SignalBuilder,
    segmenter: SwingSegmenter,
    detector: Box<dyn ContactDetector>,
}

impl VideoAnalyzer {
    pub fn new(config: &Config, width: u32, height: u32, frame_rate: f32) -> Result<Self, AnalysisError> {
        Ok(Self {
            tracker: RegionTracker::new(height, width, &config.tracking)?,
            signal: SignalBuilder::new(width, height, frame_rate, &config.signal)?,
            segmenter: SwingSegmenter::new(&config.segmenter),
            detector: Box::new(PeakWristSpeedDetector::new(config.signal.min_confidence)),
        })
    }

    pub fn with_contact_detector(mut self, detector: Box<dyn ContactDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// 次フレームで推定器に渡すクロップ領域
    pub fn crop_region(&self) -> CropRegion {
        self.tracker.current()
    }

    pub fn stats(&self) -> SegmenterStats {
        self.segmenter.stats()
    }

    /// フレーム全体の正規化座標の姿勢を投入
    pub fn push_pose(&mut self, pose: &Pose) -> Result<Option<Swing>, AnalysisError> {
        self.tracker.update(pose);
        let frame = self.signal.push(pose);
        let event = self.segmenter.push(frame);
        self.handle(event)
    }

    /// 推定器の生出力（フレーム全体の正規化座標）を投入
    pub fn push_keypoints(&mut self, raw: &[[f32; 3]]) -> Result<Option<Swing>, AnalysisError> {
        let pose = Pose::from_raw(raw)?;
        self.push_pose(&pose)
    }

    /// 現在のクロップ領域内の座標で推定された生出力を投入
    pub fn push_crop_keypoints(&mut self, raw: &[[f32; 3]]) -> Result<Option<Swing>, AnalysisError> {
        let local = Pose::from_raw(raw)?;
        let pose = remap_pose(&local, &self.tracker.current());
        self.push_pose(&pose)
    }

    /// デコード済み画像を推定器にかけて投入
    pub fn push_image<E: PoseEstimator + ?Sized>(
        &mut self,
        estimator: &mut E,
        frame: &RgbFrame,
    ) -> anyhow::Result<Option<Swing>> {
        let crop = self.tracker.current();
        let pose = estimate_full_frame(estimator, frame, &crop)?;
        Ok(self.push_pose(&pose)?)
    }

    /// 入力終端。追跡中のスイングを閉じる
    pub fn finish(mut self) -> Result<Option<Swing>, AnalysisError> {
        let event = self.segmenter.finish();
        self.handle(event)
    }

    fn handle(&mut self, event: SegmentEvent) -> Result<Option<Swing>, AnalysisError> {
        if event.completion() == Some(CompletionReason::VisibilityLost) {
            // 被写体を見失ったので追跡状態を捨てる
            self.tracker.reset();
            self.signal.reset();
        }
        match event {
            SegmentEvent::Emitted(segment) => {
                Swing::from_segment(segment, self.detector.as_ref()).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// 1局面分の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub frame_count: usize,
    /// 採点対象外の局面では `None`
    pub score: Option<PhaseScore>,
    pub deviations: Vec<FeatureDeviation>,
}

/// 1スイング分の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwingReport {
    pub start_frame: usize,
    pub end_frame: usize,
    /// スイング内のインデックス
    pub contact_frame_index: usize,
    pub completion: CompletionReason,
    /// 採点局面が1つも無ければ `None`
    pub overall_score: Option<f32>,
    pub phases: PhaseMap<PhaseReport>,
    pub labels: Vec<SwingPhase>,
    pub labels_from_model: bool,
}

/// 特徴量・局面ラベル・局面集約
#[derive(Debug, Clone)]
pub struct SwingAnalysis {
    pub features: Vec<FeatureVector>,
    pub labels: PhaseLabels,
    pub aggregates: PhaseMap<PhaseAggregate>,
}

/// 確定済みスイングの採点
///
/// 参照プロファイルとモデルは読み取り専用。同じスイングとプロファイルに対しては
/// 何度呼んでも同じ結果になる。
pub struct SwingScorer {
    extractor: FeatureExtractor,
    aggregator: PhaseAggregator,
    classifier: PhaseClassifierAdapter,
    quality: QualityScorer,
    scoring: ScoringConfig,
}

impl SwingScorer {
    /// ヒューリスティックのみ（モデルなし）
    pub fn new(config: &Config) -> Self {
        Self {
            extractor: FeatureExtractor::new(&config.features),
            aggregator: PhaseAggregator::new(&config.features),
            classifier: PhaseClassifierAdapter::heuristic(&config.smoothing),
            quality: QualityScorer::new(&config.scoring, &config.features),
            scoring: config.scoring.clone(),
        }
    }

    pub fn with_classifier(mut self, classifier: Box<dyn PhaseClassifier>, config: &Config) -> Self {
        self.classifier = PhaseClassifierAdapter::new(classifier, &config.smoothing);
        self
    }

    pub fn with_quality(mut self, quality: QualityScorer) -> Self {
        self.quality = quality;
        self
    }

    pub fn analyze(&mut self, swing: &Swing, is_right_handed: bool) -> Result<SwingAnalysis, AnalysisError> {
        let features = self.extractor.extract_swing(swing.frames(), is_right_handed);
        let labels = self.classifier.classify(&features)?;
        let aggregates = self.aggregator.aggregate_by_phase(&features, &labels.labels)?;
        Ok(SwingAnalysis {
            features,
            labels,
            aggregates,
        })
    }

    pub fn score(
        &mut self,
        swing: &Swing,
        is_right_handed: bool,
        profile: Option<&ReferenceProfile>,
    ) -> Result<SwingReport, AnalysisError> {
        let analysis = self.analyze(swing, is_right_handed)?;
        Ok(self.report(swing, analysis, profile))
    }

    /// 解析済みの結果からレポートを組み立てる
    pub fn report(
        &mut self,
        swing: &Swing,
        analysis: SwingAnalysis,
        profile: Option<&ReferenceProfile>,
    ) -> SwingReport {
        let scores = self.quality.score_phases(&analysis.aggregates);
        let overall = overall_score(&scores, &self.scoring);

        let phases = analysis.aggregates.map(|phase, aggregate| {
            let deviations = profile
                .and_then(|p| p.phase(phase))
                .map(|reference| compute_deviations(&aggregate.mean, reference, &self.scoring))
                .unwrap_or_default();
            PhaseReport {
                frame_count: aggregate.frame_count,
                score: scores.get(phase).copied(),
                deviations,
            }
        });

        let (start_frame, end_frame) = swing.frame_range();
        SwingReport {
            start_frame,
            end_frame,
            contact_frame_index: swing.contact_frame_index(),
            completion: swing.completion(),
            overall_score: overall,
            phases,
            labels: analysis.labels.labels,
            labels_from_model: analysis.labels.is_from_model,
        }
    }
}
