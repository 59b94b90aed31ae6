//! The per-room state machine (C7).
//!
//! One `tokio::sync::Mutex<RoomInner>` serializes every cross-component
//! mutation — chosen over an actor/channel model (the shape the pack's
//! `archforge` room uses) because the room-lock semantics and the
//! room-then-sub-manager acquisition order are explicit requirements here,
//! and a message-passing actor would obscure that ordering. Grounded
//! alongside the pack's `lexi_wars::engine`, which holds its whole game
//! state behind one `Arc<RwLock<LexiWarsInner>>` rather than splitting it
//! into actors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, Mutex};

use crate::engine::{GameEngine, Settings, SubmitOutcome};
use crate::envelope::{PlayerInfo, ServerEnvelope, VotePayload};
use crate::error::{JoinError, RoomError};
use crate::kana::to_hiragana;
use crate::room_manager::{RoomSnapshot, RoomSummary};
use crate::timer::TurnTimer;
use crate::vote::{ChallengeVoteError, VoteKind, VoteManager, VoteResolution};

/// Lifecycle status named in §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
        }
    }
}

/// A joined connection's send half. Score/lives are not duplicated here —
/// they're read from the engine's `PlayerState` while a game is running,
/// and default to `(0, maxLives)` beforehand.
struct Player {
    tx: mpsc::Sender<ServerEnvelope>,
}

/// The payload handed to a [`GameOverSink`] when a room's game concludes.
#[derive(Debug, Clone)]
pub struct GameOverPayload {
    pub room_id: String,
    pub reason: String,
    pub loser: Option<String>,
    pub winner: Option<String>,
    pub scores: Vec<PlayerInfo>,
    pub history: Vec<crate::engine::HistoryEntry>,
}

/// The result-archive's hook (§6, §1 Non-goals). The archive client itself
/// is out of scope; this trait is the seam it would plug into.
pub trait GameOverSink: Send + Sync {
    fn on_game_over(&self, payload: GameOverPayload);
}

/// Default sink: logs the event. Used when no archive client is wired up.
pub struct TracingSink;

impl GameOverSink for TracingSink {
    fn on_game_over(&self, payload: GameOverPayload) {
        tracing::info!(
            room_id = %payload.room_id,
            reason = %payload.reason,
            loser = ?payload.loser,
            winner = ?payload.winner,
            "game over"
        );
    }
}

struct RoomInner {
    name: String,
    owner: String,
    status: RoomStatus,
    settings: Settings,
    players: HashMap<String, Player>,
    engine: Option<GameEngine>,
    votes: VoteManager,
    timer: TurnTimer,
    empty_since: Option<Instant>,
}

/// One active room. Cheaply `Arc`-shared between the room manager and every
/// joined connection's session.
pub struct Room {
    pub id: String,
    inner: Mutex<RoomInner>,
    on_game_over: Arc<dyn GameOverSink>,
}

fn broadcast_locked(inner: &RoomInner, env: &ServerEnvelope) {
    for player in inner.players.values() {
        let _ = player.tx.try_send(env.clone());
    }
}

fn player_snapshot(inner: &RoomInner) -> Vec<PlayerInfo> {
    let default_lives = inner.settings.max_lives.max(1);
    inner
        .players
        .keys()
        .map(|name| {
            let (score, lives) = inner
                .engine
                .as_ref()
                .and_then(|e| e.players.get(name))
                .map(|p| (p.score, p.lives))
                .unwrap_or((0, default_lives));
            PlayerInfo {
                name: name.clone(),
                score,
                lives,
            }
        })
        .collect()
}

impl Room {
    pub fn new(id: String, name: String, owner: String, settings: Settings) -> Self {
        Room {
            id,
            inner: Mutex::new(RoomInner {
                name,
                owner,
                status: RoomStatus::Waiting,
                settings: settings.normalized(),
                players: HashMap::new(),
                engine: None,
                votes: VoteManager::new(),
                timer: TurnTimer::new(),
                empty_since: Some(Instant::now()),
            }),
            on_game_over: Arc::new(TracingSink),
        }
    }

    /// Constructs a room with a custom game-over sink, for tests or a
    /// future archive-client wiring.
    pub fn with_sink(
        id: String,
        name: String,
        owner: String,
        settings: Settings,
        sink: Arc<dyn GameOverSink>,
    ) -> Self {
        let mut room = Self::new(id, name, owner, settings);
        room.on_game_over = sink;
        room
    }

    pub async fn add_player(
        &self,
        name: &str,
        tx: mpsc::Sender<ServerEnvelope>,
    ) -> Result<Vec<PlayerInfo>, JoinError> {
        let mut inner = self.inner.lock().await;
        if inner.players.len() as u32 >= inner.settings.max_players {
            return Err(JoinError::RoomFull);
        }
        if inner.players.contains_key(name) {
            return Err(JoinError::NameTaken);
        }
        inner.players.insert(name.to_string(), Player { tx });
        if let Some(engine) = inner.engine.as_mut() {
            engine.add_player(name);
        }
        inner.empty_since = None;
        Ok(player_snapshot(&inner))
    }

    pub async fn remove_player(&self, name: &str) -> Vec<PlayerInfo> {
        let mut inner = self.inner.lock().await;
        inner.players.remove(name);
        if let Some(engine) = inner.engine.as_mut() {
            engine.remove_player(name);
        }
        if inner.players.is_empty() {
            inner.empty_since = Some(Instant::now());
        }
        player_snapshot(&inner)
    }

    pub async fn is_owner(&self, name: &str) -> bool {
        self.inner.lock().await.owner == name
    }

    pub async fn is_member(&self, name: &str) -> bool {
        self.inner.lock().await.players.contains_key(name)
    }

    pub async fn player_count(&self) -> usize {
        self.inner.lock().await.players.len()
    }

    pub async fn status_is_playing(&self) -> bool {
        self.inner.lock().await.status == RoomStatus::Playing
    }

    /// The current turn's player name, if a game is in progress. Used to
    /// bring a mid-game joiner's `turn_update` up to date.
    pub async fn current_turn(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .engine
            .as_ref()
            .and_then(|e| e.current_player())
            .map(str::to_string)
    }

    /// `None` for private rooms (excluded from `get_rooms`).
    pub async fn summary(&self) -> Option<RoomSummary> {
        let inner = self.inner.lock().await;
        if inner.settings.private {
            return None;
        }
        Some(RoomSummary {
            id: self.id.clone(),
            name: inner.name.clone(),
            owner: inner.owner.clone(),
            status: inner.status.as_str().to_string(),
            player_count: inner.players.len(),
            max_players: inner.settings.max_players,
            settings: inner.settings.clone(),
        })
    }

    /// The `GET /room/{id}` invite-card snapshot (§6). Served regardless of
    /// `settings.private` — privacy only excludes a room from the public
    /// `get_rooms` listing, not from a direct link.
    pub async fn http_snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.lock().await;
        RoomSnapshot {
            id: self.id.clone(),
            name: inner.name.clone(),
            owner: inner.owner.clone(),
            status: inner.status.as_str().to_string(),
            player_count: inner.players.len(),
            settings: inner.settings.clone(),
            players: player_snapshot(&inner),
        }
    }

    pub async fn joined_envelope(&self, you: &str) -> ServerEnvelope {
        let inner = self.inner.lock().await;
        ServerEnvelope::RoomJoined {
            id: self.id.clone(),
            name: inner.name.clone(),
            owner: inner.owner.clone(),
            status: inner.status.as_str().to_string(),
            settings: inner.settings.clone(),
            players: player_snapshot(&inner),
            you: you.to_string(),
        }
    }

    pub async fn player_list_envelope(&self) -> ServerEnvelope {
        let inner = self.inner.lock().await;
        ServerEnvelope::PlayerList {
            players: player_snapshot(&inner),
        }
    }

    pub async fn broadcast(&self, env: &ServerEnvelope) {
        let inner = self.inner.lock().await;
        broadcast_locked(&inner, env);
    }

    pub async fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        let inner = self.inner.lock().await;
        inner.empty_since.is_some_and(|t| now.duration_since(t) >= max_age)
    }

    /// Spawns the tick/expiry closures that drive `inner.timer`, each
    /// re-acquiring the room lock fresh rather than running under it — the
    /// driver's own sleep must never hold this room's lock across a
    /// suspension (§5).
    fn restart_timer(self: &Arc<Self>, inner: &mut RoomInner) {
        let seconds = inner.settings.time_limit;
        if seconds == 0 {
            return;
        }
        let tick_room = Arc::clone(self);
        let expired_room = Arc::clone(self);
        inner.timer.start(
            seconds,
            move |left| {
                let room = Arc::clone(&tick_room);
                tokio::spawn(async move { room.on_timer_tick(left).await });
            },
            move || {
                tokio::spawn(async move { expired_room.on_timer_expired().await });
            },
        );
    }

    async fn on_timer_tick(self: Arc<Self>, left: u64) {
        let inner = self.inner.lock().await;
        if inner.status == RoomStatus::Playing {
            broadcast_locked(&inner, &ServerEnvelope::Timer { left });
        }
    }

    async fn on_timer_expired(self: Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if inner.status != RoomStatus::Playing {
            return;
        }
        let loser = inner
            .engine
            .as_ref()
            .and_then(|e| e.current_player())
            .map(str::to_string);
        let scores = player_snapshot(&inner);
        let history = inner
            .engine
            .as_ref()
            .map(|e| e.history.clone())
            .unwrap_or_default();

        inner.status = RoomStatus::Finished;
        inner.timer.stop();
        inner.votes.clear();

        broadcast_locked(
            &inner,
            &ServerEnvelope::GameOver {
                reason: "タイムアップ".to_string(),
                loser: loser.clone(),
                winner: None,
                scores: scores.clone(),
                history: history.clone(),
            },
        );

        drop(inner);
        self.on_game_over.on_game_over(GameOverPayload {
            room_id: self.id.clone(),
            reason: "タイムアップ".to_string(),
            loser,
            winner: None,
            scores,
            history,
        });
    }

    /// `waiting` → `playing` per §4.7. `settings_override` replaces settings
    /// before the engine is built, if present.
    pub async fn start_game(
        self: &Arc<Self>,
        requester: &str,
        settings_override: Option<Settings>,
    ) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().await;
        if inner.owner != requester {
            return Err(RoomError::NotOwner);
        }
        if inner.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyPlaying);
        }

        if let Some(settings) = settings_override {
            inner.settings = settings.normalized();
            broadcast_locked(
                &inner,
                &ServerEnvelope::SettingsUpdated {
                    settings: inner.settings.clone(),
                },
            );
        }

        let owner = inner.owner.clone();
        let mut others: Vec<String> = inner
            .players
            .keys()
            .filter(|name| **name != owner)
            .cloned()
            .collect();
        others.shuffle(&mut rand::rng());

        let mut turn_order = vec![owner];
        turn_order.append(&mut others);

        let engine = GameEngine::new(inner.settings.clone(), turn_order.clone());
        inner.engine = Some(engine);
        inner.status = RoomStatus::Playing;
        inner.votes.clear();

        let current_turn = turn_order[0].clone();
        broadcast_locked(
            &inner,
            &ServerEnvelope::GameStarted {
                turn_order,
                current_turn,
                history: Vec::new(),
            },
        );

        self.restart_timer(&mut inner);
        Ok(())
    }

    /// Builds the `GameOverPayload` and elimination-reason envelope shared
    /// by the penalty and challenge-revert game-over paths.
    fn elimination_game_over(
        inner: &mut RoomInner,
        total_before: usize,
        eliminated_name: &str,
    ) -> Option<GameOverPayload> {
        let check = inner
            .engine
            .as_ref()
            .map(|e| e.check_elimination(eliminated_name, total_before))?;
        if !check.game_over {
            return None;
        }

        inner.status = RoomStatus::Finished;
        inner.timer.stop();
        inner.votes.clear();

        let scores = player_snapshot(inner);
        let history = inner
            .engine
            .as_ref()
            .map(|e| e.history.clone())
            .unwrap_or_default();

        let (loser, winner) = if total_before <= 1 {
            (Some(eliminated_name.to_string()), None)
        } else {
            (Some(eliminated_name.to_string()), check.last_survivor)
        };

        broadcast_locked(
            inner,
            &ServerEnvelope::GameOver {
                reason: "脱落".to_string(),
                loser: loser.clone(),
                winner: winner.clone(),
                scores: scores.clone(),
                history: history.clone(),
            },
        );

        Some(GameOverPayload {
            room_id: String::new(), // filled in by the caller, which knows `self.id`
            reason: "脱落".to_string(),
            loser,
            winner,
            scores,
            history,
        })
    }

    /// `answer` (§4.6.1 / §4.7).
    pub async fn submit_word(self: &Arc<Self>, player: &str, word: &str) {
        let mut inner = self.inner.lock().await;

        if inner.engine.is_none() {
            if let Some(p) = inner.players.get(player) {
                let _ = p.tx.try_send(ServerEnvelope::AnswerRejected {
                    reason: "ゲームが開始されていません".to_string(),
                });
            }
            return;
        }

        let has_vote_pending = inner.votes.has_pending();
        let total_players = inner.players.len();
        let outcome = {
            let engine = inner.engine.as_mut().unwrap();
            engine.validate_and_submit(word, player, has_vote_pending)
        };

        match outcome {
            SubmitOutcome::Ok => {
                let (history, current_turn) = {
                    let engine = inner.engine.as_ref().unwrap();
                    (
                        engine.history.clone(),
                        engine.current_player().unwrap_or("").to_string(),
                    )
                };
                let scores = player_snapshot(&inner);
                broadcast_locked(
                    &inner,
                    &ServerEnvelope::WordAccepted {
                        word: word.to_string(),
                        player: player.to_string(),
                        history,
                        scores,
                        current_turn,
                    },
                );
                self.restart_timer(&mut inner);
            }
            SubmitOutcome::Rejected(reason) => {
                if let Some(p) = inner.players.get(player) {
                    let _ = p.tx.try_send(ServerEnvelope::AnswerRejected { reason });
                }
            }
            SubmitOutcome::Vote => {
                let hiragana = to_hiragana(word);
                let genre = inner.settings.genre.clone();
                inner
                    .votes
                    .start_genre_vote(word, &hiragana, player, &genre);
                let payload = self.vote_payload(&inner);
                broadcast_locked(&inner, &ServerEnvelope::VoteRequest(payload));
                self.schedule_vote_timeout();
            }
            SubmitOutcome::Penalty(reason) => {
                let lives = {
                    let engine = inner.engine.as_mut().unwrap();
                    match engine.players.get_mut(player) {
                        Some(p) => {
                            p.lives = p.lives.saturating_sub(1);
                            p.lives
                        }
                        None => 0,
                    }
                };
                let all_lives = player_snapshot(&inner);
                broadcast_locked(
                    &inner,
                    &ServerEnvelope::Penalty {
                        player: player.to_string(),
                        reason,
                        lives,
                        all_lives,
                    },
                );

                let payload = Self::elimination_game_over(&mut inner, total_players, player);
                drop(inner);
                if let Some(mut payload) = payload {
                    payload.room_id = self.id.clone();
                    self.on_game_over.on_game_over(payload);
                }
            }
        }
    }

    fn vote_payload(&self, inner: &RoomInner) -> VotePayload {
        let pending = inner.votes.pending().expect("vote just started");
        let room_players: Vec<String> = inner.players.keys().cloned().collect();
        VotePayload {
            vote_type: pending.kind,
            word: pending.word.clone(),
            player: pending.player.clone(),
            challenger: pending.challenger.clone(),
            reason: pending.reason.clone(),
            votes_cast: pending.votes.len(),
            votes_needed: pending.eligible_count(&room_players),
        }
    }

    fn schedule_vote_timeout(self: &Arc<Self>) {
        let room = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            room.force_resolve_vote().await;
        });
    }

    /// `challenge`.
    pub async fn start_challenge_vote(
        self: &Arc<Self>,
        challenger: &str,
    ) -> Result<(), ChallengeVoteError> {
        let mut inner = self.inner.lock().await;
        let is_playing = inner.status == RoomStatus::Playing;
        let last = inner
            .engine
            .as_ref()
            .and_then(|e| e.history.last())
            .map(|h| (h.word.clone(), to_hiragana(&h.word), h.player.clone()));
        let player_exists = last
            .as_ref()
            .is_some_and(|(_, _, submitter)| inner.players.contains_key(submitter));

        let last_ref = last
            .as_ref()
            .map(|(w, h, p)| (w.as_str(), h.as_str(), p.as_str()));

        inner
            .votes
            .start_challenge_vote(challenger, is_playing, last_ref, player_exists)?;

        let payload = self.vote_payload(&inner);
        broadcast_locked(&inner, &ServerEnvelope::VoteRequest(payload));
        self.schedule_vote_timeout();
        Ok(())
    }

    /// `vote`.
    pub async fn cast_vote(self: &Arc<Self>, name: &str, accept: bool) {
        let mut inner = self.inner.lock().await;
        let room_players: Vec<String> = inner.players.keys().cloned().collect();
        let resolution = inner.votes.cast_vote(name, accept, &room_players);

        match resolution {
            None => {
                if inner.votes.pending().is_some() {
                    let payload = self.vote_payload(&inner);
                    broadcast_locked(&inner, &ServerEnvelope::VoteUpdate(payload));
                }
            }
            Some(res) => self.finish_vote(&mut inner, res).await,
        }
    }

    /// The vote's 15 s timeout path; a no-op if already resolved/withdrawn.
    pub async fn force_resolve_vote(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        let room_players: Vec<String> = inner.players.keys().cloned().collect();
        let resolution = inner.votes.force_resolve(&room_players);
        if let Some(res) = resolution {
            self.finish_vote(&mut inner, res).await;
        }
    }

    /// `withdraw_challenge`. Returns whether the request succeeded.
    pub async fn withdraw_challenge(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let withdrew = inner.votes.withdraw_challenge(name);
        if withdrew {
            broadcast_locked(&inner, &ServerEnvelope::ChallengeWithdrawn);
        }
        withdrew
    }

    /// `rebuttal`.
    pub async fn rebuttal(&self, name: &str, text: &str) -> Result<(), RoomError> {
        let inner = self.inner.lock().await;
        let is_challenged = inner
            .votes
            .pending()
            .is_some_and(|v| v.kind == VoteKind::Challenge && v.player == name);
        if !is_challenged {
            return Err(RoomError::NotChallenged);
        }
        if text.is_empty() {
            return Err(RoomError::EmptyRebuttal);
        }
        broadcast_locked(
            &inner,
            &ServerEnvelope::Rebuttal {
                player: name.to_string(),
                rebuttal: text.to_string(),
            },
        );
        Ok(())
    }

    async fn finish_vote(self: &Arc<Self>, inner: &mut RoomInner, res: VoteResolution) {
        let total_players = inner.players.len();

        match res.kind {
            VoteKind::Genre => {
                if res.accepted {
                    let (history, current_turn) = {
                        let engine = inner.engine.as_mut().unwrap();
                        engine.apply(&res.word, &res.player);
                        (
                            engine.history.clone(),
                            engine.current_player().unwrap_or("").to_string(),
                        )
                    };
                    let scores = player_snapshot(inner);
                    broadcast_locked(
                        inner,
                        &ServerEnvelope::VoteResult {
                            vote: VotePayload {
                                vote_type: VoteKind::Genre,
                                word: res.word.clone(),
                                player: res.player.clone(),
                                challenger: None,
                                reason: String::new(),
                                votes_cast: 0,
                                votes_needed: 0,
                            },
                            accepted: true,
                            reverted: false,
                            word: res.word.clone(),
                            current_turn: Some(current_turn.clone()),
                            history: Some(history.clone()),
                            scores: Some(scores.clone()),
                            penalty_player: None,
                            penalty_lives: None,
                            eliminated: None,
                        },
                    );
                    broadcast_locked(
                        inner,
                        &ServerEnvelope::WordAccepted {
                            word: res.word,
                            player: res.player,
                            history,
                            scores,
                            current_turn,
                        },
                    );
                    self.restart_timer(inner);
                } else {
                    broadcast_locked(
                        inner,
                        &ServerEnvelope::VoteResult {
                            vote: VotePayload {
                                vote_type: VoteKind::Genre,
                                word: res.word.clone(),
                                player: res.player.clone(),
                                challenger: None,
                                reason: String::new(),
                                votes_cast: 0,
                                votes_needed: 0,
                            },
                            accepted: false,
                            reverted: false,
                            word: res.word,
                            current_turn: None,
                            history: None,
                            scores: None,
                            penalty_player: None,
                            penalty_lives: None,
                            eliminated: None,
                        },
                    );
                }
            }
            VoteKind::Challenge => {
                if res.accepted {
                    broadcast_locked(
                        inner,
                        &ServerEnvelope::VoteResult {
                            vote: VotePayload {
                                vote_type: VoteKind::Challenge,
                                word: res.word.clone(),
                                player: res.player.clone(),
                                challenger: res.challenger.clone(),
                                reason: String::new(),
                                votes_cast: 0,
                                votes_needed: 0,
                            },
                            accepted: true,
                            reverted: false,
                            word: res.word,
                            current_turn: None,
                            history: None,
                            scores: None,
                            penalty_player: None,
                            penalty_lives: None,
                            eliminated: None,
                        },
                    );
                } else {
                    let (current_turn, history, penalty_lives) = {
                        let engine = inner.engine.as_mut().unwrap();
                        engine.revert(&res.word, &res.player);
                        (
                            engine.current_player().unwrap_or("").to_string(),
                            engine.history.clone(),
                            engine.players.get(&res.player).map(|p| p.lives),
                        )
                    };
                    let scores = player_snapshot(inner);

                    let game_over = Self::elimination_game_over(inner, total_players, &res.player);

                    broadcast_locked(
                        inner,
                        &ServerEnvelope::VoteResult {
                            vote: VotePayload {
                                vote_type: VoteKind::Challenge,
                                word: res.word.clone(),
                                player: res.player.clone(),
                                challenger: res.challenger.clone(),
                                reason: String::new(),
                                votes_cast: 0,
                                votes_needed: 0,
                            },
                            accepted: false,
                            reverted: true,
                            word: res.word,
                            current_turn: Some(current_turn),
                            history: Some(history),
                            scores: Some(scores),
                            penalty_player: Some(res.player.clone()),
                            penalty_lives,
                            eliminated: Some(
                                penalty_lives.is_some_and(|l| l == 0),
                            ),
                        },
                    );

                    if let Some(mut payload) = game_over {
                        payload.room_id = self.id.clone();
                        let sink = Arc::clone(&self.on_game_over);
                        tokio::spawn(async move { sink.on_game_over(payload) });
                    } else {
                        self.restart_timer(inner);
                    }
                }
            }
        }
    }
}
