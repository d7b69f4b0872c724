pub mod contact;
pub mod phase;
pub mod segmenter;

pub use contact::{ContactDetector, PeakWristSpeedDetector};
pub use phase::{heuristic_phase, is_qualifying, PhaseMap, SwingPhase};
pub use segmenter::{
    ClosedSegment, CompletionReason, DropCause, SegmentEvent, SegmenterStats, SwingSegmenter,
};

use crate::error::AnalysisError;
use crate::pose::signal::Frame;

/// 検出済みの1スイング
///
/// フレームは時系列順で空ではなく、打点インデックスは必ず範囲内。
#[derive(Debug, Clone)]
pub struct Swing {
    frames: Vec<Frame>,
    contact_frame_index: usize,
    completion: CompletionReason,
}

impl Swing {
    pub fn new(
        frames: Vec<Frame>,
        contact_frame_index: usize,
        completion: CompletionReason,
    ) -> Result<Self, AnalysisError> {
        if frames.is_empty() {
            return Err(AnalysisError::EmptySwing);
        }
        if contact_frame_index >= frames.len() {
            return Err(AnalysisError::ContactOutOfRange {
                index: contact_frame_index,
                len: frames.len(),
            });
        }
        Ok(Self {
            frames,
            contact_frame_index,
            completion,
        })
    }

    /// 区間を閉じて打点を検出する
    pub fn from_segment<D: ContactDetector + ?Sized>(
        segment: ClosedSegment,
        detector: &D,
    ) -> Result<Self, AnalysisError> {
        let first = segment.frames.first().ok_or(AnalysisError::EmptySwing)?;
        let meta = *first.meta();
        let contact = detector.detect(&segment.frames, meta.height, meta.width);
        Self::new(segment.frames, contact, segment.reason)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn contact_frame_index(&self) -> usize {
        self.contact_frame_index
    }

    pub fn contact_frame(&self) -> &Frame {
        &self.frames[self.contact_frame_index]
    }

    pub fn completion(&self) -> CompletionReason {
        self.completion
    }

    /// 元動画でのフレーム番号範囲（両端含む）
    pub fn frame_range(&self) -> (usize, usize) {
        let first = self.frames.first().map_or(0, Frame::index);
        let last = self.frames.last().map_or(first, Frame::index);
        (first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;
    use crate::pose::keypoint::Pose;
    use crate::pose::signal::SignalBuilder;

    fn frames(n: usize) -> Vec<Frame> {
        let mut builder = SignalBuilder::new(640, 480, 30.0, &SignalConfig::default()).unwrap();
        (0..n).map(|_| builder.push(&Pose::default())).collect()
    }

    #[test]
    fn test_swing_rejects_empty() {
        assert_eq!(
            Swing::new(Vec::new(), 0, CompletionReason::EndOfStream).unwrap_err(),
            AnalysisError::EmptySwing
        );
    }

    #[test]
    fn test_swing_rejects_contact_out_of_range() {
        assert_eq!(
            Swing::new(frames(3), 3, CompletionReason::EndOfStream).unwrap_err(),
            AnalysisError::ContactOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn test_swing_frame_range() {
        let swing = Swing::new(frames(12).split_off(2), 4, CompletionReason::Timeout).unwrap();
        assert_eq!(swing.len(), 10);
        assert_eq!(swing.frame_range(), (2, 11));
        assert_eq!(swing.contact_frame().index(), 6);
        assert_eq!(swing.completion(), CompletionReason::Timeout);
    }
}
