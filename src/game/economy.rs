//! Round Economy
//!
//! Money rules: starting cash, win/loss bonuses with a consecutive-loss
//! ladder, kill rewards and objective bonuses. Money is only mutated at
//! round boundaries or on purchase, and is always clamped to
//! `[0, max_money]`.

use serde::{Deserialize, Serialize};

use crate::game::weapons::WeaponId;

/// Why a round ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundWinReason {
    /// All players of the opposing team were eliminated
    Elimination,
    /// Round time expired with no bomb planted (CT win)
    TimeExpired,
    /// The bomb detonated (T win)
    BombExploded,
    /// The bomb was defused (CT win)
    BombDefused,
}

/// Tunable economy constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Cash granted when a player first joins
    pub starting_money: i32,
    /// Hard cap on player cash
    pub max_money: i32,
    /// Loss bonus ladder, indexed by consecutive losses (capped at the end)
    pub loss_bonus: [i32; 5],
    /// Win bonus for eliminating the enemy team
    pub win_elimination: i32,
    /// Win bonus when the round timer expires (CT)
    pub win_time_expired: i32,
    /// Win bonus when the bomb detonates (T)
    pub win_bomb_exploded: i32,
    /// Win bonus for a successful defuse (CT)
    pub win_bomb_defused: i32,
    /// Bonus paid to the planter when the bomb is armed
    pub plant_bonus: i32,
    /// Bonus paid to the defuser on a successful defuse
    pub defuse_bonus: i32,
    /// Penalty for killing a teammate
    pub team_kill_penalty: i32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_money: 800,
            max_money: 16_000,
            loss_bonus: [1400, 1900, 2400, 2900, 3400],
            win_elimination: 3250,
            win_time_expired: 3250,
            win_bomb_exploded: 3500,
            win_bomb_defused: 3500,
            plant_bonus: 300,
            defuse_bonus: 300,
            team_kill_penalty: -3300,
        }
    }
}

impl EconomyConfig {
    /// Win bonus for a given round outcome.
    pub fn win_bonus(&self, reason: RoundWinReason) -> i32 {
        match reason {
            RoundWinReason::Elimination => self.win_elimination,
            RoundWinReason::TimeExpired => self.win_time_expired,
            RoundWinReason::BombExploded => self.win_bomb_exploded,
            RoundWinReason::BombDefused => self.win_bomb_defused,
        }
    }

    /// Loss bonus after `consecutive_losses` straight losses (>= 1).
    pub fn loss_bonus(&self, consecutive_losses: u32) -> i32 {
        let index = (consecutive_losses.max(1) as usize - 1).min(self.loss_bonus.len() - 1);
        self.loss_bonus[index]
    }
}

/// Apply a signed cash delta, clamped to `[0, max_money]`.
#[inline]
pub fn apply_money(money: &mut i32, delta: i32, max_money: i32) {
    *money = (*money + delta).clamp(0, max_money);
}

/// Kill reward for a weapon (team kills use the penalty instead).
#[inline]
pub fn kill_reward(weapon: WeaponId) -> i32 {
    weapon.def().kill_reward
}

/// Kill reward for grenade kills.
pub const GRENADE_KILL_REWARD: i32 = 300;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_bonus_ladder() {
        let cfg = EconomyConfig::default();
        assert_eq!(cfg.loss_bonus(1), 1400);
        assert_eq!(cfg.loss_bonus(3), 2400);
        assert_eq!(cfg.loss_bonus(5), 3400);
        // Capped past the end of the ladder.
        assert_eq!(cfg.loss_bonus(9), 3400);
        // Degenerate zero treated as first loss.
        assert_eq!(cfg.loss_bonus(0), 1400);
    }

    #[test]
    fn test_win_bonus_by_reason() {
        let cfg = EconomyConfig::default();
        assert_eq!(cfg.win_bonus(RoundWinReason::Elimination), 3250);
        assert_eq!(cfg.win_bonus(RoundWinReason::BombExploded), 3500);
        assert_eq!(cfg.win_bonus(RoundWinReason::BombDefused), 3500);
    }

    #[test]
    fn test_apply_money_clamps() {
        let mut money = 15_500;
        apply_money(&mut money, 3250, 16_000);
        assert_eq!(money, 16_000);

        let mut broke = 100;
        apply_money(&mut broke, -3300, 16_000);
        assert_eq!(broke, 0);
    }

    #[test]
    fn test_kill_rewards_by_class() {
        assert_eq!(kill_reward(WeaponId::Knife), 1500);
        assert_eq!(kill_reward(WeaponId::Glock), 600);
        assert_eq!(kill_reward(WeaponId::Ak47), 300);
        assert_eq!(kill_reward(WeaponId::Awp), 100);
    }
}
