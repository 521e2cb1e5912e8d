//! Hysteretic speech segmentation over a VAD probability stream.
//!
//! One [`VadSegmenter::advance`] call per 512-sample window. The
//! machine is IDLE or SPEAKING; transitions carry the bookkeeping that
//! makes end-of-speech hysteretic:
//!
//! - `temp_end`: candidate segment end, armed when the probability
//!   falls below `threshold - 0.15` and cleared if speech resumes.
//! - `prev_end` / `next_start`: fallback boundaries used when a
//!   segment is force-closed at the maximum speech length, so the
//!   close lands on the last confident silence instead of mid-word.
//!
//! Probabilities inside the hysteresis gap
//! (`threshold - 0.15 <= p < threshold`) hold the current state.

use super::{SpeechSegment, VadConfig};
use crate::VAD_WINDOW_SAMPLES;

/// Width of the hold region below the speech threshold.
const HYSTERESIS_GAP: f32 = 0.15;

/// State change reported by [`VadSegmenter::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadTransition {
    /// IDLE -> SPEAKING.
    Started,
    /// SPEAKING -> IDLE, with the segment finalized.
    Ended,
}

pub struct VadSegmenter {
    threshold: f32,
    min_silence_samples: u64,
    min_silence_samples_at_max_speech: u64,
    min_speech_samples: u64,
    max_speech_samples: u64,
    window_size: u64,

    triggered: bool,
    temp_end: u64,
    current_sample: u64,
    prev_end: u64,
    next_start: u64,
    current_start: Option<u64>,
    segments: Vec<SpeechSegment>,
}

impl VadSegmenter {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.threshold,
            min_silence_samples: config.min_silence_samples(),
            min_silence_samples_at_max_speech: config.min_silence_samples_at_max_speech(),
            min_speech_samples: config.min_speech_samples(),
            max_speech_samples: config.max_speech_samples(),
            window_size: VAD_WINDOW_SAMPLES as u64,
            triggered: false,
            temp_end: 0,
            current_sample: 0,
            prev_end: 0,
            next_start: 0,
            current_start: None,
            segments: Vec::new(),
        }
    }

    /// Consume one window's speech probability.
    pub fn advance(&mut self, prob: f32) -> Option<VadTransition> {
        self.current_sample += self.window_size;

        if prob >= self.threshold {
            if self.temp_end != 0 {
                self.temp_end = 0;
                if self.next_start < self.prev_end {
                    self.next_start = self.current_sample - self.window_size;
                }
            }
            if !self.triggered {
                self.triggered = true;
                self.current_start = Some(self.current_sample - self.window_size);
                return Some(VadTransition::Started);
            }
            return None;
        }

        if self.triggered {
            if let Some(start) = self.current_start {
                if self.current_sample - start > self.max_speech_samples {
                    return self.force_close(start);
                }
            }
        }

        if prob >= self.threshold - HYSTERESIS_GAP {
            // Hysteresis gap: hold state.
            return None;
        }

        if self.triggered {
            if self.temp_end == 0 {
                self.temp_end = self.current_sample;
            }
            if self.current_sample - self.temp_end > self.min_silence_samples_at_max_speech {
                self.prev_end = self.temp_end;
            }
            if self.current_sample - self.temp_end >= self.min_silence_samples {
                if let Some(start) = self.current_start {
                    if self.temp_end - start > self.min_speech_samples {
                        self.segments.push(SpeechSegment {
                            start,
                            end: self.temp_end,
                        });
                        self.current_start = None;
                        self.prev_end = 0;
                        self.next_start = 0;
                        self.temp_end = 0;
                        self.triggered = false;
                        return Some(VadTransition::Ended);
                    }
                }
            }
        }

        None
    }

    /// Segment exceeded the maximum length. Close at `prev_end` when a
    /// confident silence candidate exists — possibly re-opening at
    /// `next_start` — otherwise cut at the current sample.
    fn force_close(&mut self, start: u64) -> Option<VadTransition> {
        if self.prev_end > 0 {
            self.segments.push(SpeechSegment {
                start,
                end: self.prev_end,
            });
            if self.next_start < self.prev_end {
                self.triggered = false;
                self.current_start = None;
            } else {
                self.current_start = Some(self.next_start);
            }
            self.prev_end = 0;
            self.next_start = 0;
            self.temp_end = 0;
        } else {
            self.segments.push(SpeechSegment {
                start,
                end: self.current_sample,
            });
            self.current_start = None;
            self.prev_end = 0;
            self.next_start = 0;
            self.temp_end = 0;
            self.triggered = false;
        }

        if self.triggered {
            // Re-opened at next_start: speech is continuous.
            None
        } else {
            Some(VadTransition::Ended)
        }
    }

    /// Zero all counters and forget recorded segments.
    pub fn reset(&mut self) {
        self.triggered = false;
        self.temp_end = 0;
        self.current_sample = 0;
        self.prev_end = 0;
        self.next_start = 0;
        self.current_start = None;
        self.segments.clear();
    }

    pub fn is_speaking(&self) -> bool {
        self.triggered
    }

    /// Total samples consumed; monotonically non-decreasing.
    pub fn current_sample(&self) -> u64 {
        self.current_sample
    }

    /// Finalized segments, in order.
    pub fn segments(&self) -> &[SpeechSegment] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = VAD_WINDOW_SAMPLES as u64;

    fn config() -> VadConfig {
        VadConfig {
            min_speech_ms: 10, // 160 samples
            ..VadConfig::default()
        }
    }

    fn feed(seg: &mut VadSegmenter, prob: f32, windows: usize) -> Vec<VadTransition> {
        (0..windows).filter_map(|_| seg.advance(prob)).collect()
    }

    #[test]
    fn starts_on_first_window_at_or_above_threshold() {
        let mut seg = VadSegmenter::new(&config());

        assert_eq!(feed(&mut seg, 0.1, 3), vec![]);
        assert_eq!(seg.advance(0.5), Some(VadTransition::Started));
        assert!(seg.is_speaking());
    }

    #[test]
    fn segment_start_is_the_window_that_triggered() {
        let mut seg = VadSegmenter::new(&config());

        feed(&mut seg, 0.1, 4);
        seg.advance(0.9);
        // 4 silent windows consumed before the trigger window.
        feed(&mut seg, 0.9, 7);
        let transitions = feed(&mut seg, 0.1, 8);

        assert_eq!(transitions, vec![VadTransition::Ended]);
        assert_eq!(seg.segments().len(), 1);
        assert_eq!(seg.segments()[0].start, 4 * WINDOW);
    }

    #[test]
    fn finalizes_after_min_silence_with_end_at_temp_end() {
        let mut seg = VadSegmenter::new(&config());

        assert_eq!(seg.advance(0.9), Some(VadTransition::Started));
        feed(&mut seg, 0.9, 8); // 9 speech windows total

        // temp_end arms on the first silent window (sample 10 * WINDOW);
        // min_silence (1600) elapses on the 5th.
        let transitions = feed(&mut seg, 0.1, 5);
        assert_eq!(transitions, vec![VadTransition::Ended]);
        assert!(!seg.is_speaking());
        assert_eq!(
            seg.segments(),
            &[SpeechSegment {
                start: 0,
                end: 10 * WINDOW,
            }]
        );
    }

    #[test]
    fn speech_shorter_than_min_speech_never_finalizes() {
        let mut seg = VadSegmenter::new(&VadConfig::default()); // min_speech = 4000

        seg.advance(0.9); // one window of speech (512 samples)
        let transitions = feed(&mut seg, 0.1, 50);

        assert_eq!(transitions, vec![]);
        assert!(seg.is_speaking());
        assert!(seg.segments().is_empty());
    }

    #[test]
    fn hysteresis_gap_holds_the_speaking_state() {
        let mut seg = VadSegmenter::new(&config());

        seg.advance(0.9);
        feed(&mut seg, 0.9, 7);

        // 0.4 is below threshold but inside the gap: no temp_end, so this
        // can never finalize no matter how long it lasts.
        let transitions = feed(&mut seg, 0.40, 30);
        assert_eq!(transitions, vec![]);
        assert!(seg.is_speaking());
        assert!(seg.segments().is_empty());
    }

    #[test]
    fn resuming_speech_clears_the_pending_end() {
        let mut seg = VadSegmenter::new(&config());

        seg.advance(0.9);
        feed(&mut seg, 0.9, 7);
        feed(&mut seg, 0.1, 2); // arms temp_end, short of min_silence
        feed(&mut seg, 0.9, 4); // speech resumes

        // The earlier dip must not count toward this silence run.
        let transitions = feed(&mut seg, 0.1, 4);
        assert_eq!(transitions, vec![]);
        assert!(seg.is_speaking());

        assert_eq!(seg.advance(0.1), Some(VadTransition::Ended));
    }

    #[test]
    fn force_close_without_silence_candidate_cuts_at_current_sample() {
        let mut seg = VadSegmenter::new(&VadConfig {
            min_speech_ms: 10,
            max_speech_secs: 0.16, // 2560 samples = 5 windows
            ..VadConfig::default()
        });

        seg.advance(0.9);
        feed(&mut seg, 0.9, 5);
        // First sub-threshold window past max_speech closes immediately.
        assert_eq!(seg.advance(0.1), Some(VadTransition::Ended));
        assert!(!seg.is_speaking());
        assert_eq!(
            seg.segments(),
            &[SpeechSegment {
                start: 0,
                end: 7 * WINDOW,
            }]
        );
    }

    #[test]
    fn force_close_with_silence_candidate_reopens_without_ending() {
        let mut seg = VadSegmenter::new(&VadConfig {
            min_silence_ms: 1_000,    // large, so the dip cannot finalize
            min_speech_ms: 10,
            max_speech_secs: 0.5,     // 8000 samples
            ..VadConfig::default()
        });

        // Speech, then a dip long enough to promote temp_end to prev_end
        // (98 ms) but far short of min_silence.
        feed(&mut seg, 0.9, 2);
        feed(&mut seg, 0.1, 5); // temp_end = 1536, prev_end = 1536 on the 5th
        feed(&mut seg, 0.9, 8); // resumes; next_start = 3584

        // Past max_speech: closes at prev_end and re-opens at next_start.
        assert_eq!(seg.advance(0.1), None);
        assert!(seg.is_speaking());
        assert_eq!(
            seg.segments(),
            &[SpeechSegment {
                start: 0,
                end: 3 * WINDOW,
            }]
        );
    }

    #[test]
    fn current_sample_counts_every_window_consumed() {
        let mut seg = VadSegmenter::new(&config());

        let probs = [0.9, 0.1, 0.6, 0.4, 0.0, 0.9];
        let mut last = 0;
        for (i, prob) in probs.iter().cycle().take(100).enumerate() {
            seg.advance(*prob);
            assert!(seg.current_sample() >= last);
            last = seg.current_sample();
            assert_eq!(seg.current_sample(), (i as u64 + 1) * WINDOW);
        }
    }

    #[test]
    fn reset_zeroes_counters_and_segments() {
        let mut seg = VadSegmenter::new(&config());

        seg.advance(0.9);
        feed(&mut seg, 0.9, 10);
        feed(&mut seg, 0.1, 10);
        assert!(!seg.segments().is_empty());

        seg.reset();
        assert_eq!(seg.current_sample(), 0);
        assert!(!seg.is_speaking());
        assert!(seg.segments().is_empty());
    }
}
