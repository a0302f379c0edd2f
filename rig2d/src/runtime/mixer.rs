//! Animation track mixing.
//!
//! A [`TrackMixer`] owns a fixed-size set of independently playable tracks.
//! Each track holds one playing entry, at most one crossfade source that is
//! being faded out, and a queue of entries waiting to start. Per update the
//! mixer advances every track, blends the sampled values onto the pose and
//! queues timeline events for delivery once the whole update has committed.

use crate::runtime::{Pose, apply_animation, collect_events};
use crate::{Error, EventKey, SkeletonTemplate};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Number of addressable tracks per mixer.
pub const MAX_TRACKS: usize = 16;

/// Crossfade durations derived from the template: a default plus explicit
/// per-pair overrides keyed by (from, to) animation index.
#[derive(Clone, Debug)]
pub struct MixerData {
    pub(crate) template: Arc<SkeletonTemplate>,
    default_mix: f32,
    mixes: HashMap<(usize, usize), f32>,
}

impl MixerData {
    pub fn new(template: Arc<SkeletonTemplate>) -> Self {
        Self {
            template,
            default_mix: 0.0,
            mixes: HashMap::new(),
        }
    }

    pub fn default_mix(&self) -> f32 {
        self.default_mix
    }

    pub fn set_default_mix(&mut self, duration: f32) -> Result<(), Error> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: "mix duration must be finite and >= 0".to_string(),
            });
        }
        self.default_mix = duration;
        Ok(())
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(Error::InvalidValue {
                message: "mix duration must be finite and >= 0".to_string(),
            });
        }
        let Some((from_index, _)) = self.template.animation(from) else {
            return Err(Error::UnknownAnimation {
                name: from.to_string(),
            });
        };
        let Some((to_index, _)) = self.template.animation(to) else {
            return Err(Error::UnknownAnimation {
                name: to.to_string(),
            });
        };
        self.mixes.insert((from_index, to_index), duration);
        Ok(())
    }

    pub(crate) fn mix_duration(&self, from_index: usize, to_index: usize) -> f32 {
        self.mixes
            .get(&(from_index, to_index))
            .copied()
            .unwrap_or(self.default_mix)
    }
}

/// What happened on a track, delivered to the host listener.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackEventKind {
    /// A newly begun entry took its first sample.
    Start,
    /// An entry was replaced or cleared before completing naturally.
    End,
    /// A loop boundary was crossed, or a non-looping entry reached its end.
    Complete { loop_count: u32 },
    /// A named event key in the animation's timeline was crossed.
    Custom {
        name: String,
        int_value: i32,
        float_value: f32,
        string_value: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackEvent {
    pub track: usize,
    pub kind: TrackEventKind,
}

/// Host-side sink for track events, invoked synchronously during `advance`
/// after all pose values for the update have been committed.
pub trait TrackEventListener {
    fn on_track_event(&mut self, event: &TrackEvent);
}

impl<F: FnMut(&TrackEvent)> TrackEventListener for F {
    fn on_track_event(&mut self, event: &TrackEvent) {
        self(event)
    }
}

/// One playing animation on a track.
#[derive(Clone, Debug)]
pub struct TrackEntry {
    pub animation_index: usize,
    pub looped: bool,
    /// Seconds since the entry started sampling; never wrapped.
    pub time: f32,
    /// Remaining hold before the entry starts sampling.
    pub delay: f32,
    pub loop_count: u32,
    started: bool,
    ended: bool,
    last_event_time: f32,
}

impl TrackEntry {
    fn new(animation_index: usize, looped: bool, time: f32, delay: f32) -> Self {
        Self {
            animation_index,
            looped,
            time,
            delay,
            loop_count: 0,
            started: false,
            ended: false,
            last_event_time: -1.0,
        }
    }

    /// Whether a non-looping entry has reached its end and is holding its
    /// final pose.
    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

#[derive(Clone, Debug)]
struct MixingFrom {
    entry: TrackEntry,
    mix_time: f32,
    mix_duration: f32,
}

#[derive(Clone, Debug)]
struct QueuedEntry {
    animation_index: usize,
    looped: bool,
    delay: f32,
    /// Track time (on the predecessor's axis) at which this entry starts.
    /// Resolved when the entry becomes next in line.
    trigger: Option<f32>,
}

#[derive(Clone, Debug)]
struct Track {
    current: TrackEntry,
    mixing_from: Option<MixingFrom>,
    queue: VecDeque<QueuedEntry>,
}

/// Blends N independently playable animation tracks into one pose.
#[derive(Debug)]
pub struct TrackMixer {
    data: MixerData,
    tracks: Vec<Option<Track>>,
    events: VecDeque<TrackEvent>,
}

impl TrackMixer {
    pub fn new(data: MixerData) -> Self {
        Self {
            data,
            tracks: (0..MAX_TRACKS).map(|_| None).collect(),
            events: VecDeque::new(),
        }
    }

    pub fn data(&self) -> &MixerData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut MixerData {
        &mut self.data
    }

    pub fn set_mix(&mut self, from: &str, to: &str, duration: f32) -> Result<(), Error> {
        self.data.set_mix(from, to, duration)
    }

    /// Currently playing entry on `track`, if any.
    pub fn track_entry(&self, track: usize) -> Option<&TrackEntry> {
        self.tracks.get(track)?.as_ref().map(|t| &t.current)
    }

    /// Replaces whatever plays on `track` with a fresh entry, discarding the
    /// queue. The replaced entry is kept only as the crossfade source for the
    /// registered mix duration. `delay > 0` holds the new entry that many
    /// seconds before sampling begins.
    pub fn set_animation(
        &mut self,
        track: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<(), Error> {
        if track >= MAX_TRACKS {
            return Err(Error::InvalidTrackIndex { index: track });
        }
        let Some((animation_index, _)) = self.data.template.animation(name) else {
            return Err(Error::UnknownAnimation {
                name: name.to_string(),
            });
        };

        let entry = TrackEntry::new(animation_index, looped, 0.0, delay.max(0.0));
        match self.tracks[track].as_mut() {
            Some(existing) => {
                if !existing.current.ended {
                    self.events.push_back(TrackEvent {
                        track,
                        kind: TrackEventKind::End,
                    });
                }
                let mix_duration = self
                    .data
                    .mix_duration(existing.current.animation_index, animation_index);
                let old = std::mem::replace(&mut existing.current, entry);
                existing.mixing_from = (mix_duration > 0.0).then_some(MixingFrom {
                    entry: old,
                    mix_time: 0.0,
                    mix_duration,
                });
                existing.queue.clear();
            }
            None => {
                self.tracks[track] = Some(Track {
                    current: entry,
                    mixing_from: None,
                    queue: VecDeque::new(),
                });
            }
        }
        Ok(())
    }

    /// Appends an entry to the track's queue; an empty track begins playing
    /// at once. A queued entry starts `delay` seconds relative to the
    /// preceding entry's natural end, so `delay <= 0` starts before the
    /// predecessor finishes and crossfades without a gap.
    pub fn add_animation(
        &mut self,
        track: usize,
        name: &str,
        looped: bool,
        delay: f32,
    ) -> Result<(), Error> {
        if track >= MAX_TRACKS {
            return Err(Error::InvalidTrackIndex { index: track });
        }
        let Some((animation_index, _)) = self.data.template.animation(name) else {
            return Err(Error::UnknownAnimation {
                name: name.to_string(),
            });
        };

        match self.tracks[track].as_mut() {
            Some(existing) => {
                let trigger = if existing.queue.is_empty() {
                    let duration = self
                        .data
                        .template
                        .animations
                        .get(existing.current.animation_index)
                        .map_or(0.0, |a| a.duration);
                    Some((natural_end(&existing.current, duration) + delay).max(0.0))
                } else {
                    None
                };
                existing.queue.push_back(QueuedEntry {
                    animation_index,
                    looped,
                    delay,
                    trigger,
                });
            }
            None => {
                self.tracks[track] = Some(Track {
                    current: TrackEntry::new(animation_index, looped, 0.0, delay.max(0.0)),
                    mixing_from: None,
                    queue: VecDeque::new(),
                });
            }
        }
        Ok(())
    }

    /// Stops and discards everything on `track` immediately. No crossfade;
    /// properties driven solely by this track keep their last sampled value.
    pub fn clear_track(&mut self, track: usize) {
        let Some(existing) = self.tracks.get_mut(track).and_then(Option::take) else {
            return;
        };
        if !existing.current.ended {
            self.events.push_back(TrackEvent {
                track,
                kind: TrackEventKind::End,
            });
        }
    }

    pub fn clear_all_tracks(&mut self) {
        for track in 0..self.tracks.len() {
            self.clear_track(track);
        }
    }

    /// Advances every track by `dt` and applies the blended result onto
    /// `pose`. Fired events accumulate until [`TrackMixer::drain_events`].
    pub fn update(&mut self, pose: &mut Pose, dt: f32) {
        for track_index in 0..self.tracks.len() {
            let Some(mut track) = self.tracks[track_index].take() else {
                continue;
            };
            self.update_track(track_index, &mut track, pose, dt);
            self.tracks[track_index] = Some(track);
        }
    }

    /// Removes and returns all queued events, oldest first.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        self.events.drain(..).collect()
    }

    fn update_track(&mut self, track_index: usize, track: &mut Track, pose: &mut Pose, dt: f32) {
        let template = self.data.template.clone();

        let mut step = dt;
        if track.current.delay > 0.0 {
            track.current.delay -= dt;
            if track.current.delay > 0.0 {
                step = 0.0;
            } else {
                step = -track.current.delay;
                track.current.delay = 0.0;
            }
        }
        let sampling = track.current.delay <= 0.0;

        // The crossfade source keeps playing while it fades; its weight only
        // advances once the incoming entry actually samples.
        if let Some(from) = track.mixing_from.as_mut() {
            from.entry.time += dt;
            if sampling {
                from.mix_time += dt;
            }
        }

        if !sampling {
            if let Some(from) = track.mixing_from.as_ref() {
                apply_entry(&template, &from.entry, pose, 1.0);
            }
            return;
        }

        self.fire_start(track_index, track);
        track.current.time += step;

        // Hand over to queued entries. An entry that hands over mid-flight
        // (negative delay) only completes and fires events up to the
        // handover point.
        loop {
            let duration = template
                .animations
                .get(track.current.animation_index)
                .map_or(0.0, |a| a.duration);
            let base = natural_end(&track.current, duration);
            let mut trigger = None;
            if let Some(front) = track.queue.front_mut() {
                if front.trigger.is_none() {
                    front.trigger = Some((base + front.delay).max(0.0));
                }
                trigger = front.trigger;
            }
            match trigger {
                Some(at) if track.current.time >= at => {
                    self.process_completion(track_index, track, &template, at);
                    self.fire_timeline_events(track_index, track, &template, at);
                    self.switch_to_queued(track_index, track, at);
                    self.fire_start(track_index, track);
                }
                _ => {
                    let horizon = track.current.time;
                    self.process_completion(track_index, track, &template, horizon);
                    break;
                }
            }
        }

        let mut alpha = 1.0;
        if let Some(from) = track.mixing_from.as_ref() {
            apply_entry(&template, &from.entry, pose, 1.0);
            alpha = if from.mix_duration <= 0.0 {
                1.0
            } else {
                (from.mix_time / from.mix_duration).clamp(0.0, 1.0)
            };
        }

        apply_entry(&template, &track.current, pose, alpha);
        let horizon = track.current.time;
        self.fire_timeline_events(track_index, track, &template, horizon);

        if track
            .mixing_from
            .as_ref()
            .is_some_and(|from| from.mix_time >= from.mix_duration)
        {
            track.mixing_from = None;
        }
    }

    fn fire_start(&mut self, track_index: usize, track: &mut Track) {
        if track.current.started {
            return;
        }
        track.current.started = true;
        self.events.push_back(TrackEvent {
            track: track_index,
            kind: TrackEventKind::Start,
        });
    }

    /// Fires completion events for everything the entry finished up to
    /// `horizon` on its own time axis.
    fn process_completion(
        &mut self,
        track_index: usize,
        track: &mut Track,
        template: &SkeletonTemplate,
        horizon: f32,
    ) {
        let entry = &mut track.current;
        let Some(animation) = template.animations.get(entry.animation_index) else {
            return;
        };
        let duration = animation.duration;

        if entry.looped {
            if duration > 0.0 {
                let completed = (horizon / duration).floor().max(0.0) as u32;
                while entry.loop_count < completed {
                    entry.loop_count += 1;
                    self.events.push_back(TrackEvent {
                        track: track_index,
                        kind: TrackEventKind::Complete {
                            loop_count: entry.loop_count,
                        },
                    });
                }
            }
        } else if !entry.ended && horizon >= duration {
            entry.ended = true;
            entry.loop_count = 1;
            self.events.push_back(TrackEvent {
                track: track_index,
                kind: TrackEventKind::Complete { loop_count: 1 },
            });
        }
    }

    /// Replaces the current entry with the queue front, which starts at
    /// track time `trigger` on the outgoing entry's axis.
    fn switch_to_queued(&mut self, track_index: usize, track: &mut Track, trigger: f32) {
        let Some(queued) = track.queue.pop_front() else {
            return;
        };
        if !track.current.ended {
            self.events.push_back(TrackEvent {
                track: track_index,
                kind: TrackEventKind::End,
            });
        }

        let overshoot = (track.current.time - trigger).max(0.0);
        let mix_duration = self
            .data
            .mix_duration(track.current.animation_index, queued.animation_index);
        let old = std::mem::replace(
            &mut track.current,
            TrackEntry::new(queued.animation_index, queued.looped, overshoot, 0.0),
        );
        track.mixing_from = (mix_duration > 0.0).then_some(MixingFrom {
            entry: old,
            mix_time: 0.0,
            mix_duration,
        });
    }

    /// Fires custom timeline events the entry crossed up to `horizon` on
    /// its own time axis.
    fn fire_timeline_events(
        &mut self,
        track_index: usize,
        track: &mut Track,
        template: &SkeletonTemplate,
        horizon: f32,
    ) {
        let entry = &mut track.current;
        let Some(animation) = template.animations.get(entry.animation_index) else {
            return;
        };
        let Some(timeline) = animation.event_timeline.as_ref() else {
            entry.last_event_time = horizon;
            return;
        };

        let duration = animation.duration;
        let from = entry.last_event_time;
        let mut keys: Vec<EventKey> = Vec::new();

        if entry.looped && duration > 0.0 {
            // Event times repeat every loop; compare against unwrapped time.
            let to = horizon;
            let start_loop = (from.max(0.0) / duration).floor() as i64;
            let end_loop = (to / duration).floor() as i64;
            for loop_index in start_loop..=end_loop {
                let offset = loop_index as f32 * duration;
                for key in &timeline.keys {
                    let t = offset + key.time;
                    if t > from && t <= to {
                        keys.push(key.clone());
                    }
                }
            }
            entry.last_event_time = to;
        } else {
            let to = horizon.min(duration);
            collect_events(timeline, from, to, &mut keys);
            entry.last_event_time = to;
        }

        for key in keys {
            self.events.push_back(TrackEvent {
                track: track_index,
                kind: TrackEventKind::Custom {
                    name: key.name,
                    int_value: key.int_value,
                    float_value: key.float_value,
                    string_value: key.string_value,
                },
            });
        }
    }
}

fn apply_entry(template: &SkeletonTemplate, entry: &TrackEntry, pose: &mut Pose, alpha: f32) {
    let Some(animation) = template.animations.get(entry.animation_index) else {
        return;
    };
    let duration = animation.duration;
    let time = if entry.looped && duration > 0.0 {
        entry.time.rem_euclid(duration)
    } else {
        entry.time.min(duration)
    };
    apply_animation(animation, pose, time, alpha);
}

/// Track time at which `entry` would naturally hand over to a successor: its
/// duration, or the end of the loop iteration in progress when looping.
fn natural_end(entry: &TrackEntry, duration: f32) -> f32 {
    if entry.looped && duration > 0.0 {
        duration * ((entry.time / duration).floor().max(0.0) + 1.0)
    } else {
        duration
    }
}
