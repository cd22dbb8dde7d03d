use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ads::{AdBreakSchedule, BreakCursor, ContentRecord};
use crate::config::PlayerSection;

use super::error::PlaybackError;
use super::events::{
    AdEvent, AdRequest, PlayAttempt, PlayOutcome, PlaybackEvent, SlotDimensions, SlotId,
    TimerToken,
};
use super::{AdSubsystem, GuardTimer, MediaElement, PlaybackObserver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub ads_enabled: bool,
    pub guard_timeout: Duration,
    pub slot: SlotDimensions,
    pub midrolls_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_section(&PlayerSection::default())
    }
}

impl SessionConfig {
    pub fn from_section(section: &PlayerSection) -> Self {
        Self {
            ads_enabled: section.ads_enabled,
            guard_timeout: section.guard_timeout(),
            slot: SlotDimensions {
                width: section.slot_width,
                height: section.slot_height,
            },
            midrolls_enabled: section.midrolls_enabled,
        }
    }
}

/// What the player is about to show, as read from the content record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTarget {
    pub content_id: String,
    pub ad_tag: Option<String>,
    pub ad_breaks: AdBreakSchedule,
}

impl PlaybackTarget {
    pub fn from_record(record: &ContentRecord) -> Self {
        Self {
            content_id: record.id.clone(),
            ad_tag: record.ad_config.ad_tag().map(str::to_string),
            ad_breaks: record
                .ad_config
                .ad_breaks
                .clone()
                .unwrap_or_else(AdBreakSchedule::pre_roll_only),
        }
    }
}

pub struct SessionParts {
    pub ad: Box<dyn AdSubsystem>,
    pub media: Box<dyn MediaElement>,
    pub observer: Box<dyn PlaybackObserver>,
    pub timer: Box<dyn GuardTimer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    ContentRequested,
    AdRequested,
    AdPlaying,
    Fallback,
    ContentResuming,
    ContentPlaying,
    ContentPaused,
    Ended,
    Failed,
    Closed,
}

impl SessionState {
    pub fn shows_ad(&self) -> bool {
        matches!(self, SessionState::AdRequested | SessionState::AdPlaying)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub content_id: String,
    pub final_state: SessionState,
    pub ad_slots_requested: u32,
    pub ads_completed: u32,
    pub ad_failures: u32,
}

/// One viewer's player: at most one ad slot in flight, one guard timer, and
/// an ad surface that is never visible together with the content surface.
pub struct PlaybackSession {
    id: Uuid,
    config: SessionConfig,
    target: PlaybackTarget,
    parts: SessionParts,
    state: SessionState,
    alive: bool,
    armed: Option<TimerToken>,
    next_token: u64,
    pending_play: Option<PlayAttempt>,
    open_slot: Option<SlotId>,
    ad_loaded: bool,
    ad_visible: bool,
    ad_started: bool,
    cursor: BreakCursor,
    ad_slots_requested: u32,
    ads_completed: u32,
    ad_failures: u32,
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("target", &self.target)
            .field("state", &self.state)
            .field("armed", &self.armed)
            .finish()
    }
}

impl PlaybackSession {
    pub fn new(config: SessionConfig, target: PlaybackTarget, parts: SessionParts) -> Self {
        let id = Uuid::new_v4();
        let cursor = BreakCursor::new(&target.ad_breaks);
        info!(
            target: "playback",
            session = %id,
            content_id = %target.content_id,
            ads_enabled = config.ads_enabled,
            has_tag = target.ad_tag.is_some(),
            breaks = %target.ad_breaks,
            "playback session opened"
        );
        Self {
            id,
            config,
            target,
            parts,
            state: SessionState::Idle,
            alive: true,
            armed: None,
            next_token: 0,
            pending_play: None,
            open_slot: None,
            ad_loaded: false,
            ad_visible: false,
            ad_started: false,
            cursor,
            ad_slots_requested: 0,
            ads_completed: 0,
            ad_failures: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            SessionState::Ended | SessionState::Failed | SessionState::Closed
        )
    }

    pub fn armed_guard(&self) -> Option<TimerToken> {
        self.armed
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            content_id: self.target.content_id.clone(),
            final_state: self.state,
            ad_slots_requested: self.ad_slots_requested,
            ads_completed: self.ads_completed,
            ad_failures: self.ad_failures,
        }
    }

    pub fn handle(&mut self, event: PlaybackEvent) {
        if !self.alive {
            debug!(target: "playback", session = %self.id, ?event, "event after teardown ignored");
            return;
        }

        match event {
            PlaybackEvent::Play => self.on_play(),
            PlaybackEvent::Pause => self.on_pause(),
            PlaybackEvent::AdReady(slot) => self.on_ad_ready(slot),
            PlaybackEvent::AdRequestFailed(slot, reason) => self.on_ad_request_failed(slot, reason),
            PlaybackEvent::AdLoadFailed(reason) => {
                self.on_ad_failure(PlaybackError::AdLoad(reason))
            }
            PlaybackEvent::Ad(event) => self.on_ad_event(event),
            PlaybackEvent::GuardExpired(token) => self.on_guard_expired(token),
            PlaybackEvent::PlayResolved { attempt, outcome } => {
                self.on_play_resolved(attempt, outcome)
            }
            PlaybackEvent::TimeUpdate { position_seconds } => self.on_time_update(position_seconds),
            PlaybackEvent::MediaError(reason) => self.on_media_error(reason),
            PlaybackEvent::ContentEnded => self.on_content_ended(),
            PlaybackEvent::Close => self.close(),
        }
    }

    /// Releases the guard timer and the ad subsystem. Every later event is a
    /// no-op.
    pub fn close(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.release_ad();
        self.pending_play = None;
        self.transition(SessionState::Closed);
        info!(
            target: "playback",
            session = %self.id,
            slots = self.ad_slots_requested,
            completed = self.ads_completed,
            failures = self.ad_failures,
            "playback session closed"
        );
    }

    fn on_play(&mut self) {
        match self.state {
            SessionState::Idle => {
                self.transition(SessionState::ContentRequested);
                match self.ad_tag() {
                    Some(tag) => self.open_ad_slot(tag, 0),
                    None => self.resume_content(),
                }
            }
            SessionState::ContentPaused => {
                self.transition(SessionState::ContentResuming);
                self.parts.media.set_visible(true);
                self.request_play(PlayAttempt::Unmuted);
            }
            state => {
                debug!(target: "playback", session = %self.id, ?state, "play ignored, session already active");
            }
        }
    }

    fn on_pause(&mut self) {
        match self.state {
            SessionState::ContentPlaying | SessionState::ContentResuming => {
                self.pending_play = None;
                self.parts.media.pause();
                self.transition(SessionState::ContentPaused);
                self.parts.observer.on_content_pause();
            }
            state => {
                debug!(target: "playback", session = %self.id, ?state, "pause ignored");
            }
        }
    }

    fn ad_tag(&self) -> Option<String> {
        if !self.config.ads_enabled {
            return None;
        }
        self.target.ad_tag.clone()
    }

    fn open_ad_slot(&mut self, tag_url: String, offset_seconds: u32) {
        // Content leaves the screen before the ad surface can appear.
        self.parts.media.pause();
        self.parts.media.set_visible(false);

        let token = self.issue_token();
        self.parts.timer.arm(token, self.config.guard_timeout);
        self.armed = Some(token);
        self.ad_loaded = true;
        self.ad_started = false;
        self.ad_slots_requested += 1;
        let slot_id = SlotId(self.ad_slots_requested);
        self.open_slot = Some(slot_id);

        self.transition(SessionState::AdRequested);
        let request = AdRequest {
            slot_id,
            tag_url,
            slot: self.config.slot,
            offset_seconds,
        };
        info!(
            target: "playback",
            session = %self.id,
            offset = offset_seconds,
            slot = %slot_id,
            %token,
            "requesting ad"
        );
        self.parts.ad.request_ad(&request);
    }

    fn on_ad_ready(&mut self, slot: SlotId) {
        if self.open_slot != Some(slot) {
            debug!(
                target: "playback",
                session = %self.id,
                %slot,
                state = ?self.state,
                "ad ready for a closed slot discarded"
            );
            // A newer slot owns the subsystem while an ad is on screen or requested.
            if !self.state.shows_ad() {
                self.parts.ad.destroy();
            }
            return;
        }
        match self.state {
            SessionState::AdRequested => {
                self.cancel_guard();
                self.parts.media.pause();
                self.parts.ad.set_visible(true);
                self.ad_visible = true;
                self.transition(SessionState::AdPlaying);
                self.parts.ad.start();
            }
            SessionState::AdPlaying => {
                debug!(target: "playback", session = %self.id, "duplicate ad ready ignored");
            }
            state => {
                // The slot already fell back to content; drop the late creative.
                debug!(target: "playback", session = %self.id, ?state, "late ad ready discarded");
                self.parts.ad.destroy();
            }
        }
    }

    fn on_ad_event(&mut self, event: AdEvent) {
        if !self.state.shows_ad() {
            debug!(target: "playback", session = %self.id, ?event, state = ?self.state, "ad event outside slot ignored");
            return;
        }

        match event {
            AdEvent::Started => {
                self.parts.media.pause();
                if self.state == SessionState::AdPlaying && !self.ad_started {
                    self.ad_started = true;
                    self.parts.observer.on_ad_start();
                }
            }
            AdEvent::ContentPauseRequested => {
                self.parts.media.pause();
                self.parts.media.set_visible(false);
            }
            AdEvent::Error(reason) => self.on_ad_failure(PlaybackError::AdPlayback(reason)),
            resume if resume.resumes_content() => {
                if self.state == SessionState::AdPlaying {
                    self.ads_completed += 1;
                    self.parts.observer.on_ad_complete();
                    self.resume_content();
                } else {
                    debug!(target: "playback", session = %self.id, event = ?resume, "resume before ad ready ignored");
                }
            }
            _ => {}
        }
    }

    fn on_ad_request_failed(&mut self, slot: SlotId, reason: String) {
        if self.open_slot != Some(slot) {
            debug!(
                target: "playback",
                session = %self.id,
                %slot,
                %reason,
                "ad request failure for a closed slot ignored"
            );
            return;
        }
        self.on_ad_failure(PlaybackError::AdRequest(reason));
    }

    fn on_ad_failure(&mut self, error: PlaybackError) {
        if !self.state.shows_ad() {
            debug!(target: "playback", session = %self.id, %error, "ad failure outside slot ignored");
            return;
        }
        self.fallback(error);
    }

    fn on_guard_expired(&mut self, token: TimerToken) {
        if self.state != SessionState::AdRequested || self.armed != Some(token) {
            debug!(target: "playback.timer", session = %self.id, %token, "stale guard expiry ignored");
            return;
        }
        self.armed = None;
        self.fallback(PlaybackError::AdTimeout(self.config.guard_timeout));
    }

    fn fallback(&mut self, error: PlaybackError) {
        self.cancel_guard();
        self.ad_failures += 1;
        warn!(target: "playback", session = %self.id, reason = %error, "ad failed, falling back to content");
        self.transition(SessionState::Fallback);
        self.parts.observer.on_error(&error);
        self.resume_content();
    }

    fn resume_content(&mut self) {
        self.release_ad();
        self.transition(SessionState::ContentResuming);
        self.parts.media.set_visible(true);
        self.request_play(PlayAttempt::Unmuted);
    }

    fn request_play(&mut self, attempt: PlayAttempt) {
        self.pending_play = Some(attempt);
        if attempt == PlayAttempt::Muted {
            self.parts.media.set_muted(true);
        }
        self.parts.media.play(attempt);
    }

    fn on_play_resolved(&mut self, attempt: PlayAttempt, outcome: PlayOutcome) {
        if self.state != SessionState::ContentResuming || self.pending_play != Some(attempt) {
            debug!(target: "playback", session = %self.id, ?attempt, "stale play result ignored");
            return;
        }

        match (outcome, attempt) {
            (PlayOutcome::Started, _) => {
                self.pending_play = None;
                self.transition(SessionState::ContentPlaying);
                self.parts.observer.on_content_start();
            }
            (PlayOutcome::Rejected(reason), PlayAttempt::Unmuted) => {
                warn!(target: "playback", session = %self.id, %reason, "autoplay rejected, retrying muted");
                self.request_play(PlayAttempt::Muted);
            }
            (PlayOutcome::Rejected(reason), PlayAttempt::Muted) => {
                warn!(target: "playback", session = %self.id, %reason, "muted autoplay rejected");
                self.pending_play = None;
                self.transition(SessionState::ContentPaused);
                self.parts.observer.on_error(&PlaybackError::AutoplayBlocked);
            }
        }
    }

    fn on_time_update(&mut self, position_seconds: f64) {
        if !self.config.midrolls_enabled || self.state != SessionState::ContentPlaying {
            return;
        }
        let Some(offset) = self.cursor.advance(position_seconds) else {
            return;
        };
        if let Some(tag) = self.ad_tag() {
            self.open_ad_slot(tag, offset);
        }
    }

    fn on_media_error(&mut self, reason: String) {
        if matches!(self.state, SessionState::Ended | SessionState::Failed) {
            return;
        }
        self.release_ad();
        self.pending_play = None;
        let error = PlaybackError::ContentPlayback(reason);
        warn!(target: "playback", session = %self.id, reason = %error, "content media failed");
        self.transition(SessionState::Failed);
        self.parts.observer.on_error(&error);
    }

    fn on_content_ended(&mut self) {
        if self.state == SessionState::ContentPlaying {
            self.transition(SessionState::Ended);
        }
    }

    /// Closes the open slot: cancels its guard, destroys the creative and hides
    /// the ad surface.
    fn release_ad(&mut self) {
        self.cancel_guard();
        self.open_slot = None;
        if self.ad_loaded {
            self.parts.ad.destroy();
            self.ad_loaded = false;
        }
        if self.ad_visible {
            self.parts.ad.set_visible(false);
            self.ad_visible = false;
        }
    }

    fn issue_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    fn cancel_guard(&mut self) {
        if let Some(token) = self.armed.take() {
            debug!(target: "playback.timer", session = %self.id, %token, "guard cancelled");
            self.parts.timer.cancel(token);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(target: "playback", session = %self.id, from = ?self.state, to = ?next, "transition");
        self.state = next;
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        RequestAd(u32),
        AdStart,
        AdVisible(bool),
        AdDestroy,
        Play(PlayAttempt),
        Pause,
        Muted(bool),
        ContentVisible(bool),
        Arm(TimerToken),
        Cancel(TimerToken),
        OnAdStart,
        OnAdComplete,
        OnContentStart,
        OnContentPause,
        OnError(PlaybackError),
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct FakeAd(Log);
    struct FakeMedia(Log);
    struct FakeObserver(Log);
    struct FakeTimer(Log);

    impl AdSubsystem for FakeAd {
        fn request_ad(&mut self, request: &AdRequest) {
            self.0.lock().unwrap().push(Call::RequestAd(request.offset_seconds));
        }
        fn start(&mut self) {
            self.0.lock().unwrap().push(Call::AdStart);
        }
        fn set_visible(&mut self, visible: bool) {
            self.0.lock().unwrap().push(Call::AdVisible(visible));
        }
        fn destroy(&mut self) {
            self.0.lock().unwrap().push(Call::AdDestroy);
        }
    }

    impl MediaElement for FakeMedia {
        fn play(&mut self, attempt: PlayAttempt) {
            self.0.lock().unwrap().push(Call::Play(attempt));
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().push(Call::Pause);
        }
        fn set_muted(&mut self, muted: bool) {
            self.0.lock().unwrap().push(Call::Muted(muted));
        }
        fn set_visible(&mut self, visible: bool) {
            self.0.lock().unwrap().push(Call::ContentVisible(visible));
        }
    }

    impl PlaybackObserver for FakeObserver {
        fn on_ad_start(&mut self) {
            self.0.lock().unwrap().push(Call::OnAdStart);
        }
        fn on_ad_complete(&mut self) {
            self.0.lock().unwrap().push(Call::OnAdComplete);
        }
        fn on_content_start(&mut self) {
            self.0.lock().unwrap().push(Call::OnContentStart);
        }
        fn on_content_pause(&mut self) {
            self.0.lock().unwrap().push(Call::OnContentPause);
        }
        fn on_error(&mut self, error: &PlaybackError) {
            self.0.lock().unwrap().push(Call::OnError(error.clone()));
        }
    }

    impl GuardTimer for FakeTimer {
        fn arm(&mut self, token: TimerToken, _after: Duration) {
            self.0.lock().unwrap().push(Call::Arm(token));
        }
        fn cancel(&mut self, token: TimerToken) {
            self.0.lock().unwrap().push(Call::Cancel(token));
        }
    }

    const TAG: &str = "https://ads.example/vast";

    fn ads_config() -> SessionConfig {
        SessionConfig {
            ads_enabled: true,
            ..SessionConfig::default()
        }
    }

    fn session_with(
        config: SessionConfig,
        tag: Option<&str>,
        breaks: &[u32],
    ) -> (PlaybackSession, Log) {
        let log: Log = Arc::default();
        let target = PlaybackTarget {
            content_id: "content-1".into(),
            ad_tag: tag.map(str::to_string),
            ad_breaks: AdBreakSchedule::try_from(breaks.to_vec()).unwrap(),
        };
        let parts = SessionParts {
            ad: Box::new(FakeAd(log.clone())),
            media: Box::new(FakeMedia(log.clone())),
            observer: Box::new(FakeObserver(log.clone())),
            timer: Box::new(FakeTimer(log.clone())),
        };
        (PlaybackSession::new(config, target, parts), log)
    }

    fn session() -> (PlaybackSession, Log) {
        session_with(ads_config(), Some(TAG), &[0])
    }

    fn calls(log: &Log) -> Vec<Call> {
        log.lock().unwrap().clone()
    }

    fn count(log: &Log, call: &Call) -> usize {
        log.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn position(log: &Log, call: &Call) -> usize {
        log.lock()
            .unwrap()
            .iter()
            .position(|c| c == call)
            .unwrap_or_else(|| panic!("{call:?} not recorded"))
    }

    fn started() -> PlaybackEvent {
        PlaybackEvent::PlayResolved {
            attempt: PlayAttempt::Unmuted,
            outcome: PlayOutcome::Started,
        }
    }

    #[test]
    fn target_reads_tag_only_when_monetized() {
        let mut record = ContentRecord::new("feature", "movie");
        record.ad_config.vast_tag_url = Some(TAG.into());
        let target = PlaybackTarget::from_record(&record);
        assert_eq!(target.ad_tag, None);
        assert_eq!(target.ad_breaks, AdBreakSchedule::pre_roll_only());

        record.ad_config.monetization_enabled = true;
        record.ad_config.ad_breaks = Some(AdBreakSchedule::try_from(vec![0, 720]).unwrap());
        let target = PlaybackTarget::from_record(&record);
        assert_eq!(target.ad_tag.as_deref(), Some(TAG));
        assert_eq!(target.ad_breaks.midrolls(), &[720]);
    }

    #[test]
    fn config_follows_player_section() {
        let section = PlayerSection {
            ads_enabled: true,
            guard_timeout_ms: 1500,
            ..PlayerSection::default()
        };
        let config = SessionConfig::from_section(&section);
        assert!(config.ads_enabled);
        assert_eq!(config.guard_timeout, Duration::from_millis(1500));
        assert_eq!(config.slot, SlotDimensions::default());
        assert!(!SessionConfig::default().ads_enabled);
    }

    #[test]
    fn content_without_tag_plays_directly() {
        let (mut session, log) = session_with(ads_config(), None, &[0]);
        session.handle(PlaybackEvent::Play);
        assert_eq!(session.state(), SessionState::ContentResuming);
        session.handle(started());
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(
            calls(&log),
            vec![
                Call::ContentVisible(true),
                Call::Play(PlayAttempt::Unmuted),
                Call::OnContentStart,
            ]
        );
    }

    #[test]
    fn ads_disabled_ignores_configured_tag() {
        let (mut session, log) = session_with(SessionConfig::default(), Some(TAG), &[0]);
        session.handle(PlaybackEvent::Play);
        session.handle(started());
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(count(&log, &Call::RequestAd(0)), 0);
    }

    #[test]
    fn pre_roll_completes_then_content_starts() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        assert_eq!(session.state(), SessionState::AdRequested);
        let token = session.armed_guard().unwrap();

        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        assert_eq!(session.state(), SessionState::AdPlaying);
        assert_eq!(session.armed_guard(), None);
        session.handle(PlaybackEvent::Ad(AdEvent::Started));
        session.handle(PlaybackEvent::Ad(AdEvent::Complete));
        assert_eq!(session.state(), SessionState::ContentResuming);
        session.handle(started());
        assert_eq!(session.state(), SessionState::ContentPlaying);

        assert_eq!(count(&log, &Call::Cancel(token)), 1);
        assert_eq!(count(&log, &Call::OnAdStart), 1);
        let ad_shown = position(&log, &Call::AdVisible(true));
        let ad_hidden = position(&log, &Call::AdVisible(false));
        assert!(position(&log, &Call::Pause) < ad_shown);
        assert!(position(&log, &Call::ContentVisible(false)) < ad_shown);
        assert!(position(&log, &Call::OnAdComplete) < position(&log, &Call::OnContentStart));
        assert!(ad_hidden < position(&log, &Call::OnContentStart));
        assert!(ad_hidden < position(&log, &Call::ContentVisible(true)));
        assert_eq!(session.summary().ads_completed, 1);
    }

    #[test]
    fn ad_request_failure_reports_once_and_plays_once() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdRequestFailed(SlotId(1), "network".into()));
        assert_eq!(session.state(), SessionState::ContentResuming);

        let error = Call::OnError(PlaybackError::AdRequest("network".into()));
        assert_eq!(count(&log, &error), 1);
        assert_eq!(count(&log, &Call::Play(PlayAttempt::Unmuted)), 1);
        assert!(position(&log, &error) < position(&log, &Call::Play(PlayAttempt::Unmuted)));
        assert_eq!(session.armed_guard(), None);
    }

    #[test]
    fn guard_expiry_resumes_content_exactly_once() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        let token = session.armed_guard().unwrap();

        session.handle(PlaybackEvent::GuardExpired(token));
        assert_eq!(session.state(), SessionState::ContentResuming);
        session.handle(PlaybackEvent::GuardExpired(token));
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::AdRequestFailed(SlotId(1), "late".into()));
        session.handle(started());

        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(count(&log, &Call::Play(PlayAttempt::Unmuted)), 1);
        assert_eq!(count(&log, &Call::AdStart), 0);
        assert_eq!(count(&log, &Call::AdVisible(true)), 0);
        let timeouts = calls(&log)
            .into_iter()
            .filter(|call| matches!(call, Call::OnError(PlaybackError::AdTimeout(_))))
            .count();
        assert_eq!(timeouts, 1);
    }

    #[test]
    fn stale_guard_after_ready_is_ignored() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        let token = session.armed_guard().unwrap();
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::GuardExpired(token));
        assert_eq!(session.state(), SessionState::AdPlaying);
        assert!(!calls(&log)
            .iter()
            .any(|call| matches!(call, Call::OnError(_))));
    }

    #[test]
    fn every_resume_signal_converges() {
        for signal in [
            AdEvent::Complete,
            AdEvent::Skipped,
            AdEvent::AllAdsCompleted,
            AdEvent::ContentResumeRequested,
        ] {
            let (mut session, log) = session();
            session.handle(PlaybackEvent::Play);
            session.handle(PlaybackEvent::AdReady(SlotId(1)));
            session.handle(PlaybackEvent::Ad(signal.clone()));
            assert_eq!(session.state(), SessionState::ContentResuming, "{signal:?}");
            session.handle(PlaybackEvent::Ad(AdEvent::AllAdsCompleted));
            assert_eq!(count(&log, &Call::OnAdComplete), 1, "{signal:?}");
            assert_eq!(count(&log, &Call::Play(PlayAttempt::Unmuted)), 1, "{signal:?}");
        }
    }

    #[test]
    fn ad_playback_error_falls_back() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::Ad(AdEvent::Error("decode".into())));
        assert_eq!(session.state(), SessionState::ContentResuming);
        assert_eq!(
            count(&log, &Call::OnError(PlaybackError::AdPlayback("decode".into()))),
            1
        );
        assert_eq!(count(&log, &Call::AdDestroy), 1);
        assert_eq!(count(&log, &Call::OnAdComplete), 0);
        assert_eq!(session.summary().ad_failures, 1);
    }

    #[test]
    fn ad_sdk_load_failure_falls_back() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdLoadFailed("script blocked".into()));
        assert_eq!(session.state(), SessionState::ContentResuming);
        assert_eq!(
            count(&log, &Call::OnError(PlaybackError::AdLoad("script blocked".into()))),
            1
        );
    }

    #[test]
    fn content_is_repaused_when_ad_starts() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        let before = count(&log, &Call::Pause);
        session.handle(PlaybackEvent::Ad(AdEvent::ContentPauseRequested));
        session.handle(PlaybackEvent::Ad(AdEvent::Started));
        session.handle(PlaybackEvent::Ad(AdEvent::Started));
        assert_eq!(count(&log, &Call::Pause), before + 3);
        assert_eq!(count(&log, &Call::OnAdStart), 1);
    }

    #[test]
    fn second_play_does_not_issue_second_request() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::Play);
        assert_eq!(count(&log, &Call::RequestAd(0)), 1);
        assert_eq!(session.state(), SessionState::AdPlaying);
    }

    #[test]
    fn autoplay_rejection_retries_muted() {
        let (mut session, log) = session_with(ads_config(), None, &[0]);
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::PlayResolved {
            attempt: PlayAttempt::Unmuted,
            outcome: PlayOutcome::Rejected("NotAllowedError".into()),
        });
        assert_eq!(session.state(), SessionState::ContentResuming);
        assert!(
            position(&log, &Call::Muted(true)) < position(&log, &Call::Play(PlayAttempt::Muted))
        );

        session.handle(PlaybackEvent::PlayResolved {
            attempt: PlayAttempt::Muted,
            outcome: PlayOutcome::Started,
        });
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert!(!calls(&log).iter().any(|call| matches!(call, Call::OnError(_))));
    }

    #[test]
    fn blocked_autoplay_waits_for_gesture() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdRequestFailed(SlotId(1), "no fill".into()));
        for attempt in [PlayAttempt::Unmuted, PlayAttempt::Muted] {
            session.handle(PlaybackEvent::PlayResolved {
                attempt,
                outcome: PlayOutcome::Rejected("NotAllowedError".into()),
            });
        }
        assert_eq!(session.state(), SessionState::ContentPaused);
        assert_eq!(count(&log, &Call::OnError(PlaybackError::AutoplayBlocked)), 1);

        session.handle(PlaybackEvent::Play);
        session.handle(started());
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(count(&log, &Call::RequestAd(0)), 1);
    }

    #[test]
    fn viewer_pause_and_resume_skip_ads() {
        let (mut session, log) = session_with(ads_config(), None, &[0]);
        session.handle(PlaybackEvent::Play);
        session.handle(started());
        session.handle(PlaybackEvent::Pause);
        assert_eq!(session.state(), SessionState::ContentPaused);
        assert_eq!(count(&log, &Call::OnContentPause), 1);
        session.handle(PlaybackEvent::Play);
        session.handle(started());
        assert_eq!(count(&log, &Call::OnContentStart), 2);
        session.handle(PlaybackEvent::ContentEnded);
        assert_eq!(session.state(), SessionState::Ended);
        assert!(session.is_finished());
    }

    #[test]
    fn teardown_releases_timer_and_silences_events() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        let token = session.armed_guard().unwrap();
        session.handle(PlaybackEvent::Close);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.is_alive());
        assert_eq!(count(&log, &Call::Cancel(token)), 1);
        assert_eq!(count(&log, &Call::AdDestroy), 1);

        let recorded = calls(&log).len();
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::GuardExpired(token));
        session.handle(started());
        session.close();
        drop(session);
        assert_eq!(calls(&log).len(), recorded);
    }

    #[test]
    fn content_media_error_is_fatal() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::MediaError("MEDIA_ERR_DECODE".into()));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.is_finished());
        let error = PlaybackError::ContentPlayback("MEDIA_ERR_DECODE".into());
        assert!(error.is_fatal());
        assert_eq!(count(&log, &Call::OnError(error)), 1);
        assert_eq!(count(&log, &Call::Play(PlayAttempt::Unmuted)), 0);
        assert_eq!(count(&log, &Call::AdDestroy), 1);
        assert_eq!(count(&log, &Call::AdVisible(false)), 1);
        assert!(position(&log, &Call::AdVisible(true)) < position(&log, &Call::AdVisible(false)));

        session.close();
        assert_eq!(count(&log, &Call::AdVisible(false)), 1);
    }

    #[test]
    fn media_error_while_ad_requested_releases_guard() {
        let (mut session, log) = session();
        session.handle(PlaybackEvent::Play);
        let token = session.armed_guard().unwrap();
        session.handle(PlaybackEvent::MediaError("MEDIA_ERR_NETWORK".into()));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.armed_guard(), None);
        assert_eq!(count(&log, &Call::Cancel(token)), 1);
        assert_eq!(count(&log, &Call::AdVisible(false)), 0);

        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        assert_eq!(count(&log, &Call::AdStart), 0);
        assert_eq!(count(&log, &Call::AdVisible(true)), 0);
    }

    #[test]
    fn midroll_opens_a_new_slot_when_enabled() {
        let config = SessionConfig {
            midrolls_enabled: true,
            ..ads_config()
        };
        let (mut session, log) = session_with(config, Some(TAG), &[0, 720, 1440]);
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::Ad(AdEvent::Complete));
        session.handle(started());

        session.handle(PlaybackEvent::TimeUpdate { position_seconds: 300.0 });
        assert_eq!(session.state(), SessionState::ContentPlaying);
        session.handle(PlaybackEvent::TimeUpdate { position_seconds: 1500.0 });
        assert_eq!(session.state(), SessionState::AdRequested);
        assert_eq!(count(&log, &Call::RequestAd(1440)), 1);
        assert_eq!(count(&log, &Call::RequestAd(720)), 0);

        session.handle(PlaybackEvent::AdRequestFailed(SlotId(2), "no fill".into()));
        session.handle(started());
        session.handle(PlaybackEvent::TimeUpdate { position_seconds: 1600.0 });
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(session.summary().ad_slots_requested, 2);
    }

    #[test]
    fn midrolls_stay_off_by_default() {
        let (mut session, log) = session_with(ads_config(), Some(TAG), &[0, 720]);
        session.handle(PlaybackEvent::Play);
        session.handle(PlaybackEvent::AdRequestFailed(SlotId(1), "no fill".into()));
        session.handle(started());
        session.handle(PlaybackEvent::TimeUpdate { position_seconds: 900.0 });
        assert_eq!(session.state(), SessionState::ContentPlaying);
        assert_eq!(count(&log, &Call::RequestAd(720)), 0);
    }

    #[test]
    fn late_pre_roll_answers_do_not_touch_the_midroll_slot() {
        let config = SessionConfig {
            midrolls_enabled: true,
            ..ads_config()
        };
        let (mut session, log) = session_with(config, Some(TAG), &[0, 720]);
        session.handle(PlaybackEvent::Play);
        let token = session.armed_guard().unwrap();
        session.handle(PlaybackEvent::GuardExpired(token));
        session.handle(started());
        session.handle(PlaybackEvent::TimeUpdate { position_seconds: 800.0 });
        assert_eq!(session.state(), SessionState::AdRequested);
        assert_eq!(count(&log, &Call::RequestAd(720)), 1);
        let destroyed = count(&log, &Call::AdDestroy);

        session.handle(PlaybackEvent::AdReady(SlotId(1)));
        session.handle(PlaybackEvent::AdRequestFailed(SlotId(1), "late".into()));
        assert_eq!(session.state(), SessionState::AdRequested);
        assert_eq!(count(&log, &Call::AdStart), 0);
        assert_eq!(count(&log, &Call::AdVisible(true)), 0);
        assert_eq!(count(&log, &Call::AdDestroy), destroyed);
        assert_eq!(session.summary().ad_failures, 1);

        session.handle(PlaybackEvent::AdReady(SlotId(2)));
        assert_eq!(session.state(), SessionState::AdPlaying);
        assert_eq!(count(&log, &Call::AdStart), 1);
    }
}
