//! The command path: every inbound frame lands here, and every mutation of
//! a game runs inside this service's per-game lock.
//!
//! The locked cycle is always the same: reload the latest snapshot, validate
//! and apply the pure domain operation, swap the new snapshot in, write it
//! through the repository, publish the resulting events and re-arm the
//! timers. Events go out before the lock is released, so no client can see
//! a command acknowledged whose events are still unobservable. On any
//! rejection the snapshot is untouched and the timers keep running.

use crate::config::Config;
use crate::errors::CommandError;
use crate::event_bus::{AiOpponentNeeded, GameFinished, InternalBus, MatchFound, OutboundBus};
use crate::event_mapper::{self, TurnCommandKind};
use crate::flow_timer::{FlowTimerService, FlowTimeoutHandler, TimeoutKind};
use crate::game_store::{GameRepository, GameStore};
use crate::identity::PlayerDirectory;
use crate::matchmaking_service::MatchmakingService;
use crate::rate_limiter::{RateDecision, RateLimiter};
use async_trait::async_trait;
use chrono::Utc;
use hanafuda::auto_action::{self, DefaultAction};
use hanafuda::cards;
use hanafuda::game::{Game, GamePlayer, RoundCloseEffect};
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::round::{TurnContext, TurnReport};
use protocol::ErrorCode;
use protocol::events::{EventBody, GameEvent};
use protocol::frames::{Command, CommandFrame, CommandResponse, ContinueDecision};
use protocol::views::score_table;
use std::str::FromStr;
use std::sync::Arc;

pub struct SessionService {
    config: Config,
    store: Arc<GameStore>,
    repository: Arc<dyn GameRepository>,
    outbound: Arc<OutboundBus>,
    internal: Arc<InternalBus>,
    timers: Arc<FlowTimerService>,
    limiter: Arc<RateLimiter>,
    matchmaking: Arc<MatchmakingService>,
    players: Arc<dyn PlayerDirectory>,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        store: Arc<GameStore>,
        repository: Arc<dyn GameRepository>,
        outbound: Arc<OutboundBus>,
        internal: Arc<InternalBus>,
        timers: Arc<FlowTimerService>,
        limiter: Arc<RateLimiter>,
        matchmaking: Arc<MatchmakingService>,
        players: Arc<dyn PlayerDirectory>,
    ) -> Self {
        SessionService {
            config,
            store,
            repository,
            outbound,
            internal,
            timers,
            limiter,
            matchmaking,
            players,
        }
    }

    fn turn_context(&self) -> TurnContext {
        TurnContext {
            now: Utc::now(),
            settlement_countdown_seconds: self.config.display_timeout_seconds as u32,
        }
    }

    /// Routes one player-issued frame and produces its response.
    pub async fn dispatch(&self, player_id: PlayerId, frame: CommandFrame) -> CommandResponse {
        if let RateDecision::Limited {
            retry_after_seconds,
        } = self.limiter.check(player_id)
        {
            return CommandResponse::rate_limited(frame.command_id, retry_after_seconds);
        }

        let command_id = frame.command_id;
        let result = match &frame.command {
            Command::Ping => Ok(None),
            Command::JoinMatchmaking { room_type } => self
                .join_matchmaking(player_id, room_type)
                .await
                .map(Some),
            Command::CancelMatchmaking => self.matchmaking.cancel(player_id).map(|_| None),
            game_command => self
                .execute_game_command(player_id, game_command, false)
                .await
                .map(|_| None),
        };

        match result {
            Ok(message) => {
                let mut response = CommandResponse::ok(command_id);
                response.message = message.map(str::to_string);
                response
            }
            Err(err) => CommandResponse::fail(command_id, err.code, err.message),
        }
    }

    async fn join_matchmaking(
        &self,
        player_id: PlayerId,
        room_type: &str,
    ) -> Result<&'static str, CommandError> {
        let room = hanafuda::ruleset::RoomType::from_str(room_type).map_err(|_| {
            CommandError::new(
                ErrorCode::InvalidRoomType,
                format!("unknown room type {room_type:?}"),
            )
        })?;
        let player = self.players.get(player_id).await.ok_or_else(|| {
            CommandError::new(ErrorCode::PlayerNotFound, "player identity unresolved")
        })?;
        let outcome = self
            .matchmaking
            .enter(player.id, &player.display_name, room)?;
        Ok(outcome.message())
    }

    /// The locked path every game-mutating command takes. `auto` marks
    /// commands synthesized by the timeout service; they skip the rate
    /// limiter (they never pass `dispatch`) and count against the player's
    /// idle streak instead of clearing it.
    pub async fn execute_game_command(
        &self,
        player_id: PlayerId,
        command: &Command,
        auto: bool,
    ) -> Result<(), CommandError> {
        let game_id = command.game_id().ok_or_else(|| {
            CommandError::new(ErrorCode::UnknownCommand, "command addresses no game")
        })?;

        let lock = self.store.lock_for(game_id);
        let _guard = lock.lock().await;

        let game = self
            .store
            .get(game_id)
            .ok_or_else(CommandError::game_not_found)?;
        if !game.has_player(player_id) {
            return Err(CommandError::wrong_player());
        }
        let ctx = self.turn_context();

        match command {
            Command::PlayCard {
                card_id,
                target_card_id,
                ..
            } => {
                let (next, report, effect) =
                    game.play_card(player_id, *card_id, *target_card_id, &ctx)?;
                let next = next.note_activity(player_id, auto, ctx.now);
                self.commit_turn(next, &report, TurnCommandKind::Play, effect)
                    .await;
            }
            Command::SelectTarget {
                source_card_id,
                target_card_id,
                ..
            } => {
                let (next, report, effect) =
                    game.select_target(player_id, *source_card_id, *target_card_id, &ctx)?;
                let next = next.note_activity(player_id, auto, ctx.now);
                self.commit_turn(next, &report, TurnCommandKind::Select, effect)
                    .await;
            }
            Command::MakeDecision { decision, .. } => {
                let (next, report, effect) = game.make_decision(player_id, *decision, &ctx)?;
                let next = next.note_activity(player_id, auto, ctx.now);
                self.commit_turn(next, &report, TurnCommandKind::Decide(*decision), effect)
                    .await;
            }
            Command::ConfirmContinue { decision, .. } => match decision {
                ContinueDecision::Continue => {
                    let (next, all_confirmed) = game.confirm_continue(player_id, ctx.now)?;
                    let next = Arc::new(next);
                    self.persist(&next).await;
                    if all_confirmed {
                        // Everyone is ready; no reason to sit out the rest
                        // of the settlement countdown.
                        self.timers.cancel_timeout(game_id);
                        self.advance_locked(next).await;
                    }
                }
                ContinueDecision::Leave => {
                    self.force_finish_locked(&game, player_id).await?;
                }
            },
            Command::LeaveGame { .. } => {
                self.force_finish_locked(&game, player_id).await?;
            }
            other => {
                return Err(CommandError::new(
                    ErrorCode::UnknownCommand,
                    format!("{other:?} is not a game command"),
                ));
            }
        }

        if auto {
            self.enforce_idle_limit(game_id, player_id).await;
        }
        Ok(())
    }

    /// Persist, publish and re-arm for one applied turn operation.
    async fn commit_turn(
        &self,
        next: Game,
        report: &TurnReport,
        kind: TurnCommandKind,
        effect: Option<RoundCloseEffect>,
    ) {
        let next = Arc::new(next);
        self.persist(&next).await;
        let events = event_mapper::turn_events(&next, report, kind);
        self.publish_events(&next, events).await;

        match effect {
            None => self.arm_action_timer(&next),
            Some(RoundCloseEffect::AwaitingAdvance) => self.arm_display_timer(&next),
            Some(RoundCloseEffect::GameFinished) => {
                self.finish_game(&next, next.winner_by_score()).await;
            }
        }
    }

    /// A round was dealt (first round or an advance): announce it and arm
    /// whatever the resulting state needs.
    async fn after_deal(&self, game: &Arc<Game>, effect: Option<RoundCloseEffect>) {
        let events = event_mapper::round_dealt(game);
        self.publish_events(game, events).await;

        match effect {
            None => self.arm_action_timer(game),
            Some(RoundCloseEffect::AwaitingAdvance) => {
                // An instant yaku settled the round at the deal.
                let events = event_mapper::settlement_events(game);
                self.publish_events(game, events).await;
                self.arm_display_timer(game);
            }
            Some(RoundCloseEffect::GameFinished) => {
                let events = event_mapper::settlement_events(game);
                self.publish_events(game, events).await;
                self.finish_game(game, game.winner_by_score()).await;
            }
        }
    }

    fn arm_action_timer(&self, game: &Arc<Game>) {
        self.timers
            .start_timeout(game.id, TimeoutKind::Action, self.config.action_timeout());
    }

    fn arm_display_timer(&self, game: &Arc<Game>) {
        self.timers
            .start_timeout(game.id, TimeoutKind::Display, self.config.display_timeout());
    }

    /// Terminal bookkeeping shared by natural completion and forced finish.
    async fn finish_game(&self, game: &Arc<Game>, winner: Option<PlayerId>) {
        self.timers.cancel_timeout(game.id);
        let events = event_mapper::game_finished_events(game, winner);
        self.publish_events(game, events).await;
        self.internal.game_finished.publish(&GameFinished {
            game_id: game.id,
            winner_id: winner,
            final_scores: score_table(game),
            players: game.players.iter().map(|p| p.id).collect(),
            finished_at: Utc::now(),
        });
        tracing::info!(game = %game.id, winner = ?winner, "game finished");
    }

    async fn force_finish_locked(
        &self,
        game: &Arc<Game>,
        leaver: PlayerId,
    ) -> Result<(), CommandError> {
        let (next, winner) = game.force_finish(leaver, Utc::now())?;
        let next = Arc::new(next);
        self.persist(&next).await;
        self.finish_game(&next, winner).await;
        self.limiter.reset(leaver);
        tracing::info!(game = %next.id, leaver = %leaver, "game force-finished");
        Ok(())
    }

    async fn persist(&self, game: &Arc<Game>) {
        self.store.put(game.clone());
        if let Err(err) = self.repository.save(game).await {
            // The in-memory snapshot is authoritative; a failed write-through
            // must not reject the command.
            tracing::error!(?err, game = %game.id, "snapshot write-through failed");
        }
    }

    async fn publish_events(&self, game: &Arc<Game>, events: Vec<(PlayerId, GameEvent)>) {
        for (player, event) in events {
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    if let Err(err) = self
                        .repository
                        .append_log(game.id, event.kind(), payload)
                        .await
                    {
                        tracing::error!(?err, game = %game.id, "event log append failed");
                    }
                }
                Err(err) => {
                    tracing::error!(?err, game = %game.id, "event serialization failed")
                }
            }
            self.outbound.publish(
                player,
                EventBody::Game {
                    game_id: game.id,
                    event,
                },
            );
        }
    }

    /// Creates the game for a pairing announced on the internal bus, then
    /// lets the start grace elapse before the first deal.
    pub async fn handle_match_found(&self, found: MatchFound) {
        let now = Utc::now();
        let first = GamePlayer::new(
            found.player1_id,
            found.player1_name.clone(),
            found.player1_id.is_bot(),
        );
        let second = GamePlayer::new(
            found.player2_id,
            found.player2_name.clone(),
            found.player2_id.is_bot(),
        );

        let game = Game::new(GameId::random(), found.room_type, first, now);
        let game = match game.add_player(second, now) {
            Ok(game) => Arc::new(game),
            Err(err) => {
                tracing::error!(?err, "fresh game rejected its second player");
                return;
            }
        };
        self.persist(&game).await;
        tracing::info!(
            game = %game.id,
            room = %found.room_type,
            match_type = ?found.match_type,
            "game created"
        );

        if let Some(bot) = game.players.iter().find(|p| p.is_ai) {
            self.internal.ai_opponent_needed.publish(&AiOpponentNeeded {
                game_id: game.id,
                bot_player_id: bot.id,
            });
        }

        self.timers
            .start_timeout(game.id, TimeoutKind::StartGrace, self.config.start_grace());
    }

    /// The start grace ran out: deal the first round.
    async fn deal_first_round(&self, game_id: GameId) {
        let lock = self.store.lock_for(game_id);
        let _guard = lock.lock().await;
        let Some(game) = self.store.get(game_id) else {
            return;
        };

        let ctx = self.turn_context();
        let deck = cards::shuffled_deck(&mut rand::rng());
        match game.start_first_round(deck, &ctx) {
            Ok((next, effect)) => {
                let next = Arc::new(next);
                self.persist(&next).await;
                self.after_deal(&next, effect).await;
            }
            Err(err) => {
                tracing::debug!(?err, game = %game_id, "first deal skipped");
            }
        }
    }

    /// The action timeout fired: act in the idle player's stead.
    async fn run_auto_action(&self, game_id: GameId) {
        let Some(game) = self.store.get(game_id) else {
            return;
        };
        if !game.is_active() {
            return;
        }
        let Some(round) = game.current_round.as_ref() else {
            return;
        };
        let player = round.active_player;
        let Some(action) = auto_action::choose(round, player) else {
            return;
        };

        let command = match action {
            DefaultAction::PlayCard { card, target } => Command::PlayCard {
                game_id,
                card_id: card,
                target_card_id: target,
            },
            DefaultAction::SelectTarget {
                source_card,
                target,
            } => Command::SelectTarget {
                game_id,
                source_card_id: source_card,
                target_card_id: target,
            },
            DefaultAction::MakeDecision { decision } => Command::MakeDecision {
                game_id,
                decision,
            },
        };

        tracing::debug!(game = %game_id, player = %player, ?command, "action timeout, auto-acting");
        if let Err(err) = self.execute_game_command(player, &command, true).await {
            // The player may have acted between the fire and the lock; that
            // is fine. Anything else the idle player should hear about.
            tracing::debug!(?err, game = %game_id, "auto action rejected");
            self.outbound.publish(
                player,
                EventBody::Game {
                    game_id,
                    event: GameEvent::TurnError {
                        code: err.code,
                        message: err.message,
                    },
                },
            );
        }
    }

    /// Too many consecutive timeouts and the seat is treated as abandoned.
    async fn enforce_idle_limit(&self, game_id: GameId, player_id: PlayerId) {
        let Some(current) = self.store.get(game_id) else {
            return;
        };
        if !current.is_active() {
            return;
        }
        let idle = current
            .player(player_id)
            .map(|p| p.idle_turns)
            .unwrap_or(0);
        if idle < self.config.max_idle_turns {
            return;
        }
        tracing::info!(
            game = %game_id,
            player = %player_id,
            idle_turns = idle,
            "idle limit reached, forfeiting"
        );
        if let Err(err) = self.force_finish_locked(&current, player_id).await {
            tracing::debug!(?err, game = %game_id, "idle forfeit skipped");
        }
    }

    /// The settlement countdown ran out: deal on or finish.
    async fn advance_after_display(&self, game_id: GameId) {
        let lock = self.store.lock_for(game_id);
        let _guard = lock.lock().await;
        let Some(game) = self.store.get(game_id) else {
            return;
        };
        if !game.is_active() {
            return;
        }
        self.advance_locked(game).await;
    }

    /// Deals the next round. The caller holds the per-game lock.
    async fn advance_locked(&self, game: Arc<Game>) {
        let ctx = self.turn_context();
        let deck = cards::shuffled_deck(&mut rand::rng());
        match game.advance_to_next_round(deck, &ctx) {
            Ok((next, effect)) => {
                let next = Arc::new(next);
                self.persist(&next).await;
                self.after_deal(&next, effect).await;
            }
            Err(err) => {
                tracing::debug!(?err, game = %game.id, "round advance skipped");
            }
        }
    }

    /// Transport-level disconnect: the seat goes dark but the game keeps
    /// running on timeouts, waiting for a resume.
    pub async fn handle_disconnect(&self, player_id: PlayerId) {
        let Some(game) = self.store.find_active_for_player(player_id) else {
            return;
        };
        let lock = self.store.lock_for(game.id);
        let _guard = lock.lock().await;
        let Some(game) = self.store.get(game.id) else {
            return;
        };
        if !game.is_active() {
            return;
        }
        match game.mark_connection(
            player_id,
            hanafuda::game::ConnectionStatus::Disconnected,
            Utc::now(),
        ) {
            Ok(next) => {
                self.persist(&Arc::new(next)).await;
                tracing::info!(game = %game.id, player = %player_id, "player disconnected mid-game");
            }
            Err(err) => tracing::debug!(?err, "disconnect bookkeeping skipped"),
        }
    }

    /// A connection came (back) up: flag the seat and, when a game is
    /// running, resync the player with a full snapshot.
    pub async fn handle_connect(&self, player_id: PlayerId) {
        let Some(game) = self.store.find_active_for_player(player_id) else {
            return;
        };
        let lock = self.store.lock_for(game.id);
        let _guard = lock.lock().await;
        let Some(game) = self.store.get(game.id) else {
            return;
        };
        if !game.is_active() {
            return;
        }
        let next = match game.mark_connection(
            player_id,
            hanafuda::game::ConnectionStatus::Connected,
            Utc::now(),
        ) {
            Ok(next) => Arc::new(next),
            Err(err) => {
                tracing::debug!(?err, "reconnect bookkeeping skipped");
                return;
            }
        };
        self.persist(&next).await;
        if let Some(event) = event_mapper::snapshot_restore(&next, player_id) {
            self.publish_events(&next, vec![(player_id, event)]).await;
        }
        tracing::info!(game = %next.id, player = %player_id, "player resumed");
    }
}

#[async_trait]
impl FlowTimeoutHandler for SessionService {
    async fn on_timeout(&self, game_id: GameId, kind: TimeoutKind) {
        match kind {
            TimeoutKind::StartGrace => self.deal_first_round(game_id).await,
            TimeoutKind::Action => self.run_auto_action(game_id).await,
            TimeoutKind::Display => self.advance_after_display(game_id).await,
        }
    }
}
