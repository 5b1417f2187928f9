//! The game aggregate: two players, a ruleset, cumulative scores and the
//! round currently on the table.
//!
//! Like [`Round`], a `Game` is an immutable snapshot. The status walks
//! `Waiting → Starting → InProgress → Finished` and only those transitions
//! are admitted. Round settlements are absorbed here: scores accumulate, the
//! round counter advances and the continue-confirmation list is armed.

use crate::cards::CardId;
use crate::error::RuleError;
use crate::ids::{GameId, PlayerId};
use crate::round::{Decision, FlowState, Round, TurnContext, TurnReport};
use crate::ruleset::{RoomType, Ruleset};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Waiting,
    Starting,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// A seat at the table, as far as the aggregate is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayer {
    pub id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub connection: ConnectionStatus,
    pub score: u32,
    /// Consecutive turns resolved by the timeout instead of the player.
    pub idle_turns: u32,
}

impl GamePlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, is_ai: bool) -> Self {
        GamePlayer {
            id,
            name: name.into(),
            is_ai,
            connection: ConnectionStatus::Connected,
            score: 0,
            idle_turns: 0,
        }
    }
}

/// Immutable snapshot of one game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub room_type: RoomType,
    pub ruleset: Ruleset,
    pub status: GameStatus,
    pub players: Vec<GamePlayer>,
    pub rounds_played: u8,
    pub current_round: Option<Round>,
    /// Players whose continue confirmation is still outstanding after a
    /// settled round.
    pub pending_continue: Vec<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a round-settling operation means for the game as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundCloseEffect {
    /// The settlement screen is showing; the next round follows after the
    /// countdown or once everyone confirmed.
    AwaitingAdvance,
    /// That was the last round; the game is finished.
    GameFinished,
}

impl Game {
    /// A new game right after match-found, holding its first player.
    pub fn new(id: GameId, room_type: RoomType, first: GamePlayer, now: DateTime<Utc>) -> Game {
        Game {
            id,
            room_type,
            ruleset: room_type.ruleset(),
            status: GameStatus::Waiting,
            players: vec![first],
            rounds_played: 0,
            current_round: None,
            pending_continue: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Installs the second player and moves to `Starting`.
    pub fn add_player(&self, second: GamePlayer, now: DateTime<Utc>) -> Result<Game, RuleError> {
        if self.status != GameStatus::Waiting || self.players.len() != 1 {
            return Err(RuleError::InvalidStatus("add_player"));
        }
        let mut next = self.clone();
        next.players.push(second);
        next.status = GameStatus::Starting;
        next.updated_at = now;
        Ok(next)
    }

    pub fn player(&self, id: PlayerId) -> Result<&GamePlayer, RuleError> {
        self.players
            .iter()
            .find(|p| p.id == id)
            .ok_or(RuleError::NotInGame(id))
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut GamePlayer, RuleError> {
        self.players
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RuleError::NotInGame(id))
    }

    pub fn has_player(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn opponent_of(&self, id: PlayerId) -> Result<&GamePlayer, RuleError> {
        self.player(id)?;
        self.players
            .iter()
            .find(|p| p.id != id)
            .ok_or(RuleError::InvalidStatus("opponent_of"))
    }

    /// Whether the game still occupies its players, which blocks them from
    /// re-entering matchmaking.
    pub fn is_active(&self) -> bool {
        self.status != GameStatus::Finished
    }

    /// The dealer of the round with the given 1-based number. The first
    /// match-found player deals first; the deal alternates every round.
    fn dealer_for(&self, round_number: u8) -> PlayerId {
        self.players[((round_number - 1) % 2) as usize].id
    }

    /// Deals the first round, moving `Starting → InProgress`. The deck comes
    /// pre-shuffled from the caller. An instant yaku settles the round at
    /// once; the returned effect tells the caller which timers to arm.
    pub fn start_first_round(
        &self,
        deck: Vec<CardId>,
        ctx: &TurnContext,
    ) -> Result<(Game, Option<RoundCloseEffect>), RuleError> {
        if self.status != GameStatus::Starting || self.players.len() != 2 {
            return Err(RuleError::InvalidStatus("start_first_round"));
        }
        let mut next = self.clone();
        next.status = GameStatus::InProgress;
        next.deal_round_into(1, deck, ctx)?;
        next.updated_at = ctx.now;
        let effect = next.absorb_settlement_if_ended(ctx);
        Ok((next, effect))
    }

    /// Deals the next round after a settlement, clearing the continue list.
    pub fn advance_to_next_round(
        &self,
        deck: Vec<CardId>,
        ctx: &TurnContext,
    ) -> Result<(Game, Option<RoundCloseEffect>), RuleError> {
        if self.status != GameStatus::InProgress {
            return Err(RuleError::InvalidStatus("advance_to_next_round"));
        }
        match &self.current_round {
            Some(round) if round.flow_state == FlowState::RoundEnded => {}
            Some(_) => return Err(RuleError::InvalidStatus("advance_to_next_round")),
            None => return Err(RuleError::NoActiveRound),
        }
        let mut next = self.clone();
        next.pending_continue.clear();
        next.deal_round_into(self.rounds_played + 1, deck, ctx)?;
        next.updated_at = ctx.now;
        let effect = next.absorb_settlement_if_ended(ctx);
        Ok((next, effect))
    }

    fn deal_round_into(
        &mut self,
        round_number: u8,
        deck: Vec<CardId>,
        ctx: &TurnContext,
    ) -> Result<(), RuleError> {
        let dealer = self.dealer_for(round_number);
        let opponent = self
            .players
            .iter()
            .map(|p| p.id)
            .find(|p| *p != dealer)
            .expect("a starting game has two players");
        let round = Round::deal(round_number, dealer, opponent, deck, &self.ruleset, ctx)?;
        self.current_round = Some(round);
        Ok(())
    }

    /// Runs a hand-card play against the current round.
    pub fn play_card(
        &self,
        player: PlayerId,
        card: CardId,
        target: Option<CardId>,
        ctx: &TurnContext,
    ) -> Result<(Game, TurnReport, Option<RoundCloseEffect>), RuleError> {
        self.with_round(ctx, |round, ruleset| {
            round.play_hand_card(player, card, target, ruleset, ctx)
        })
    }

    /// Resolves a pending target selection on the current round.
    pub fn select_target(
        &self,
        player: PlayerId,
        source_card: CardId,
        target: CardId,
        ctx: &TurnContext,
    ) -> Result<(Game, TurnReport, Option<RoundCloseEffect>), RuleError> {
        self.with_round(ctx, |round, ruleset| {
            round.select_target(player, source_card, target, ruleset, ctx)
        })
    }

    /// Answers a pending koi-koi decision on the current round.
    pub fn make_decision(
        &self,
        player: PlayerId,
        decision: Decision,
        ctx: &TurnContext,
    ) -> Result<(Game, TurnReport, Option<RoundCloseEffect>), RuleError> {
        self.with_round(ctx, |round, ruleset| {
            round.make_decision(player, decision, ruleset, ctx)
        })
    }

    fn with_round(
        &self,
        ctx: &TurnContext,
        op: impl FnOnce(&Round, &Ruleset) -> Result<(Round, TurnReport), RuleError>,
    ) -> Result<(Game, TurnReport, Option<RoundCloseEffect>), RuleError> {
        if self.status != GameStatus::InProgress {
            return Err(RuleError::InvalidStatus("game command"));
        }
        let round = self.current_round.as_ref().ok_or(RuleError::NoActiveRound)?;
        let (new_round, report) = op(round, &self.ruleset)?;
        let mut next = self.clone();
        next.current_round = Some(new_round);
        next.updated_at = ctx.now;
        let effect = next.absorb_settlement_if_ended(ctx);
        Ok((next, report, effect))
    }

    /// Applies a fresh settlement to the aggregate: credit the winner, count
    /// the round, finish the game or arm the continue list.
    fn absorb_settlement_if_ended(&mut self, _ctx: &TurnContext) -> Option<RoundCloseEffect> {
        let round = self.current_round.as_ref()?;
        if round.flow_state != FlowState::RoundEnded {
            return None;
        }
        let settlement = round
            .settlement
            .clone()
            .expect("an ended round always carries a settlement");

        if let Some(winner) = settlement.winner {
            if let Ok(seat) = self.player_mut(winner) {
                seat.score += settlement.awarded_points;
            }
        }
        self.rounds_played += 1;

        if self.rounds_played >= self.ruleset.total_rounds {
            self.status = GameStatus::Finished;
            self.pending_continue.clear();
            Some(RoundCloseEffect::GameFinished)
        } else {
            self.pending_continue = self.players.iter().map(|p| p.id).collect();
            Some(RoundCloseEffect::AwaitingAdvance)
        }
    }

    /// Records a continue confirmation. Returns the new snapshot and whether
    /// every player has now confirmed.
    pub fn confirm_continue(
        &self,
        player: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(Game, bool), RuleError> {
        self.player(player)?;
        if self.status != GameStatus::InProgress {
            return Err(RuleError::InvalidStatus("confirm_continue"));
        }
        if !self.pending_continue.contains(&player) {
            return Err(RuleError::NoPendingConfirmation(player));
        }
        let mut next = self.clone();
        next.pending_continue.retain(|p| *p != player);
        next.updated_at = now;
        let all_confirmed = next.pending_continue.is_empty();
        Ok((next, all_confirmed))
    }

    /// Ends the game because a player left. The remaining player wins.
    pub fn force_finish(
        &self,
        leaver: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(Game, Option<PlayerId>), RuleError> {
        self.player(leaver)?;
        if self.status == GameStatus::Finished {
            return Err(RuleError::InvalidStatus("force_finish"));
        }
        let winner = self.players.iter().map(|p| p.id).find(|p| *p != leaver);
        let mut next = self.clone();
        next.status = GameStatus::Finished;
        next.pending_continue.clear();
        next.updated_at = now;
        Ok((next, winner))
    }

    /// The overall winner by cumulative score; `None` on a tie.
    pub fn winner_by_score(&self) -> Option<PlayerId> {
        let best = self.players.iter().map(|p| p.score).max()?;
        let mut at_best = self.players.iter().filter(|p| p.score == best);
        let first = at_best.next()?;
        if at_best.next().is_some() {
            None
        } else {
            Some(first.id)
        }
    }

    /// Updates the transport status of one player.
    pub fn mark_connection(
        &self,
        player: PlayerId,
        connection: ConnectionStatus,
        now: DateTime<Utc>,
    ) -> Result<Game, RuleError> {
        let mut next = self.clone();
        next.player_mut(player)?.connection = connection;
        next.updated_at = now;
        Ok(next)
    }

    /// Bumps or clears the idle counter depending on who really acted.
    /// Timeout-synthesized commands leave no trace of player activity.
    pub fn note_activity(&self, player: PlayerId, auto: bool, now: DateTime<Utc>) -> Game {
        let mut next = self.clone();
        if let Ok(seat) = next.player_mut(player) {
            if auto {
                seat.idle_turns += 1;
            } else {
                seat.idle_turns = 0;
            }
        }
        next.updated_at = now;
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::full_deck;
    use crate::round::EndReason;

    fn ctx() -> TurnContext {
        TurnContext {
            now: Utc::now(),
            settlement_countdown_seconds: 5,
        }
    }

    fn two_player_game() -> (Game, PlayerId, PlayerId) {
        let a = PlayerId::random();
        let b = PlayerId::random();
        let game = Game::new(
            GameId::random(),
            RoomType::Quick,
            GamePlayer::new(a, "alice", false),
            Utc::now(),
        );
        let game = game
            .add_player(GamePlayer::new(b, "bob", false), Utc::now())
            .unwrap();
        (game, a, b)
    }

    #[test]
    fn status_walks_waiting_starting_in_progress() {
        let (game, a, _) = two_player_game();
        assert_eq!(game.status, GameStatus::Starting);

        let mut rules_off = game.clone();
        rules_off.ruleset.instant_end_enabled = false;
        let (started, effect) = rules_off.start_first_round(full_deck(), &ctx()).unwrap();
        assert_eq!(started.status, GameStatus::InProgress);
        assert_eq!(started.rounds_played, 0);
        let round = started.current_round.as_ref().unwrap();
        assert_eq!(round.round_number, 1);
        assert_eq!(round.dealer, a);
        assert!(effect.is_none());
    }

    #[test]
    fn add_player_requires_waiting() {
        let (game, _, _) = two_player_game();
        let c = GamePlayer::new(PlayerId::random(), "carol", false);
        assert_eq!(
            game.add_player(c, Utc::now()).unwrap_err(),
            RuleError::InvalidStatus("add_player")
        );
    }

    #[test]
    fn start_requires_two_players() {
        let a = PlayerId::random();
        let lonely = Game::new(
            GameId::random(),
            RoomType::Quick,
            GamePlayer::new(a, "alice", false),
            Utc::now(),
        );
        assert!(lonely.start_first_round(full_deck(), &ctx()).is_err());
    }

    /// Drives a settled round into the aggregate by hand, without playing a
    /// full round of cards.
    fn settle_current_round(game: &Game, winner: PlayerId, points: u32) -> Game {
        let mut next = game.clone();
        {
            let round = next.current_round.as_mut().unwrap();
            round.flow_state = FlowState::RoundEnded;
            round.pending_selection = None;
            round.pending_decision = None;
            round.settlement = Some(crate::round::Settlement {
                reason: EndReason::KoiKoiStop,
                winner: Some(winner),
                yaku: Vec::new(),
                awarded_points: points,
                ended_at: Utc::now(),
                countdown_seconds: 5,
            });
        }
        let effect = next.absorb_settlement_if_ended(&ctx());
        assert!(effect.is_some());
        next
    }

    #[test]
    fn settlement_credits_scores_and_arms_continue_list() {
        let (game, a, b) = two_player_game();
        let mut no_instant = game;
        no_instant.ruleset.instant_end_enabled = false;
        let (started, _) = no_instant.start_first_round(full_deck(), &ctx()).unwrap();

        let settled = settle_current_round(&started, a, 7);
        assert_eq!(settled.player(a).unwrap().score, 7);
        assert_eq!(settled.player(b).unwrap().score, 0);
        assert_eq!(settled.rounds_played, 1);
        assert_eq!(settled.status, GameStatus::InProgress);
        assert_eq!(settled.pending_continue.len(), 2);
    }

    #[test]
    fn scores_never_decrease_across_rounds() {
        let (game, a, b) = two_player_game();
        let mut no_instant = game;
        no_instant.ruleset.instant_end_enabled = false;
        let (mut current, _) = no_instant.start_first_round(full_deck(), &ctx()).unwrap();

        let mut last_a = 0;
        let mut last_b = 0;
        for i in 0..2 {
            current = settle_current_round(&current, if i % 2 == 0 { a } else { b }, 3);
            let score_a = current.player(a).unwrap().score;
            let score_b = current.player(b).unwrap().score;
            assert!(score_a >= last_a && score_b >= last_b);
            last_a = score_a;
            last_b = score_b;
            if current.status == GameStatus::InProgress {
                let (advanced, _) = current.advance_to_next_round(full_deck(), &ctx()).unwrap();
                current = advanced;
            }
        }
    }

    #[test]
    fn last_round_finishes_the_game() {
        let (game, a, _) = two_player_game();
        let mut quick = game;
        quick.ruleset.total_rounds = 1;
        quick.ruleset.instant_end_enabled = false;
        let (started, _) = quick.start_first_round(full_deck(), &ctx()).unwrap();

        let finished = settle_current_round(&started, a, 5);
        assert_eq!(finished.status, GameStatus::Finished);
        assert!(finished.pending_continue.is_empty());
        assert_eq!(finished.winner_by_score(), Some(a));
        assert!(!finished.is_active());
    }

    #[test]
    fn confirm_continue_drains_the_pending_list() {
        let (game, a, b) = two_player_game();
        let mut no_instant = game;
        no_instant.ruleset.instant_end_enabled = false;
        let (started, _) = no_instant.start_first_round(full_deck(), &ctx()).unwrap();
        let settled = settle_current_round(&started, a, 2);

        let (one, all) = settled.confirm_continue(a, Utc::now()).unwrap();
        assert!(!all);
        let (two, all) = one.confirm_continue(b, Utc::now()).unwrap();
        assert!(all);
        assert!(two.pending_continue.is_empty());

        // A second confirmation from the same player is not pending anymore.
        assert_eq!(
            two.confirm_continue(a, Utc::now()).unwrap_err(),
            RuleError::NoPendingConfirmation(a)
        );
    }

    #[test]
    fn advance_deals_with_alternating_dealer() {
        let (game, a, b) = two_player_game();
        let mut no_instant = game;
        no_instant.ruleset.instant_end_enabled = false;
        let (started, _) = no_instant.start_first_round(full_deck(), &ctx()).unwrap();
        assert_eq!(started.current_round.as_ref().unwrap().dealer, a);

        let settled = settle_current_round(&started, a, 2);
        let (next, _) = settled.advance_to_next_round(full_deck(), &ctx()).unwrap();
        let round = next.current_round.as_ref().unwrap();
        assert_eq!(round.round_number, 2);
        assert_eq!(round.dealer, b);
        assert!(next.pending_continue.is_empty());
    }

    #[test]
    fn advance_requires_an_ended_round() {
        let (game, _, _) = two_player_game();
        let mut no_instant = game;
        no_instant.ruleset.instant_end_enabled = false;
        let (started, _) = no_instant.start_first_round(full_deck(), &ctx()).unwrap();
        assert!(started.advance_to_next_round(full_deck(), &ctx()).is_err());
    }

    #[test]
    fn force_finish_names_the_remaining_player() {
        let (game, a, b) = two_player_game();
        let (finished, winner) = game.force_finish(a, Utc::now()).unwrap();
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(winner, Some(b));

        // Finishing twice is rejected.
        assert!(finished.force_finish(b, Utc::now()).is_err());
    }

    #[test]
    fn idle_counter_tracks_auto_actions() {
        let (game, a, _) = two_player_game();
        let bumped = game.note_activity(a, true, Utc::now());
        let bumped = bumped.note_activity(a, true, Utc::now());
        assert_eq!(bumped.player(a).unwrap().idle_turns, 2);
        let cleared = bumped.note_activity(a, false, Utc::now());
        assert_eq!(cleared.player(a).unwrap().idle_turns, 0);
    }

    #[test]
    fn winner_by_score_is_none_on_a_tie() {
        let (game, _, _) = two_player_game();
        assert_eq!(game.winner_by_score(), None);
    }
}
