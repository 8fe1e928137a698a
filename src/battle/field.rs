use std::collections::{BTreeMap, BTreeSet};

use schema::{
    effectiveness, ElementType, HazardId, MoveCategory, MoveDescriptor, ScreenId, StatType,
    StatusId, TerrainId, WeatherId,
};
use serde::{Deserialize, Serialize};

use crate::battle::commands::BattleCommand;
use crate::battle::conditions::{self, DurationRoll};
use crate::battle::state::{BattleEvent, BattleState, SideId};
use crate::combatant::Combatant;

/// A field-wide effect and the turns it has left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSlot<T> {
    pub id: T,
    pub turns_remaining: u8,
}

/// Weather and terrain are global; hazards and screens belong to one side,
/// indexed by `SideId::index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BattlefieldState {
    pub weather: Option<FieldSlot<WeatherId>>,
    pub terrain: Option<FieldSlot<TerrainId>>,
    pub hazards: [BTreeSet<HazardId>; 2],
    pub screens: [BTreeMap<ScreenId, u8>; 2],
}

/// What the damage pipeline knows when asking a screen for its reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageContext {
    pub critical: bool,
}

impl BattlefieldState {
    pub fn weather(&self) -> Option<WeatherId> {
        self.weather.map(|slot| slot.id)
    }

    pub fn terrain(&self) -> Option<TerrainId> {
        self.terrain.map(|slot| slot.id)
    }

    pub fn has_hazard(&self, side: SideId, hazard: HazardId) -> bool {
        self.hazards[side.index()].contains(&hazard)
    }

    pub fn screen_active(&self, side: SideId, screen: ScreenId) -> bool {
        self.screens[side.index()].contains_key(&screen)
    }

    /// Strongest reduction any screen on `side` applies to `move_used`.
    pub fn screen_multiplier(
        &self,
        side: SideId,
        move_used: &MoveDescriptor,
        ctx: &DamageContext,
    ) -> f64 {
        self.screens[side.index()]
            .keys()
            .map(|screen| screen.reduce_damage(move_used, ctx))
            .fold(1.0, f64::min)
    }

    /// Power multiplier from the current weather and terrain.
    pub fn move_multiplier(&self, move_used: &MoveDescriptor) -> f64 {
        let weather = self.weather().map_or(1.0, |w| w.modify_move(move_used));
        let terrain = self.terrain().map_or(1.0, |t| t.modify_move(move_used));
        weather * terrain
    }

    /// Counts weather, terrain and every screen down by one turn. Whatever
    /// reaches zero is removed and reported.
    pub fn tick(&mut self) -> Vec<BattleEvent> {
        let mut expired = Vec::new();

        if let Some(slot) = self.weather.as_mut() {
            slot.turns_remaining = slot.turns_remaining.saturating_sub(1);
            if slot.turns_remaining == 0 {
                expired.push(BattleEvent::WeatherEnded { weather: slot.id });
                self.weather = None;
            }
        }

        if let Some(slot) = self.terrain.as_mut() {
            slot.turns_remaining = slot.turns_remaining.saturating_sub(1);
            if slot.turns_remaining == 0 {
                expired.push(BattleEvent::TerrainEnded { terrain: slot.id });
                self.terrain = None;
            }
        }

        for side in SideId::ALL {
            let screens = &mut self.screens[side.index()];
            screens.retain(|screen, turns| {
                *turns = turns.saturating_sub(1);
                if *turns == 0 {
                    expired.push(BattleEvent::ScreenEnded {
                        side,
                        screen: *screen,
                    });
                    false
                } else {
                    true
                }
            });
        }

        expired
    }
}

pub trait WeatherEffect {
    fn is_immune(&self, combatant: &Combatant) -> bool;
    fn on_turn_start(&self, state: &BattleState) -> Vec<BattleCommand>;
    fn modify_move(&self, move_used: &MoveDescriptor) -> f64;
}

impl WeatherEffect for WeatherId {
    fn is_immune(&self, combatant: &Combatant) -> bool {
        match self {
            WeatherId::Sandstorm => [ElementType::Rock, ElementType::Ground, ElementType::Steel]
                .into_iter()
                .any(|element| combatant.has_type(element)),
            WeatherId::Hail => combatant.has_type(ElementType::Ice),
            WeatherId::Sun | WeatherId::Rain => true,
        }
    }

    fn on_turn_start(&self, state: &BattleState) -> Vec<BattleCommand> {
        let mut commands = Vec::new();
        for id in state.all_active() {
            let Some(combatant) = state.combatant(&id) else {
                continue;
            };
            if !state.is_alive(&id) || self.is_immune(combatant) {
                continue;
            }
            commands.push(BattleCommand::EmitEvent(BattleEvent::WeatherDamage {
                target: id.clone(),
                weather: *self,
            }));
            commands.push(BattleCommand::DealDamage {
                target: id,
                amount: (combatant.max_hp() / 16).max(1),
            });
        }
        commands
    }

    fn modify_move(&self, move_used: &MoveDescriptor) -> f64 {
        match (self, move_used.element) {
            (WeatherId::Sun, ElementType::Fire) | (WeatherId::Rain, ElementType::Water) => 1.5,
            (WeatherId::Sun, ElementType::Water) | (WeatherId::Rain, ElementType::Fire) => 0.5,
            _ => 1.0,
        }
    }
}

pub trait TerrainEffect {
    fn on_turn_start(&self, state: &BattleState) -> Vec<BattleCommand>;
    fn modify_move(&self, move_used: &MoveDescriptor) -> f64;
}

impl TerrainEffect for TerrainId {
    fn on_turn_start(&self, state: &BattleState) -> Vec<BattleCommand> {
        if *self != TerrainId::Grassy {
            return Vec::new();
        }
        state
            .all_active()
            .into_iter()
            .filter(|id| state.is_alive(id) && state.hp(id) < state.max_hp(id))
            .filter_map(|id| state.combatant(&id))
            .filter(|combatant| combatant.is_grounded())
            .map(|combatant| BattleCommand::Heal {
                target: combatant.id.clone(),
                amount: (combatant.max_hp() / 16).max(1),
            })
            .collect()
    }

    fn modify_move(&self, move_used: &MoveDescriptor) -> f64 {
        match (self, move_used.element) {
            (TerrainId::Electric, ElementType::Electric)
            | (TerrainId::Psychic, ElementType::Psychic)
            | (TerrainId::Grassy, ElementType::Grass) => 1.3,
            (TerrainId::Misty, ElementType::Dragon) => 0.5,
            _ => 1.0,
        }
    }
}

pub trait HazardEffect {
    /// Commands for `target` entering `side`, whose hazards this is.
    fn on_switch_in(&self, state: &BattleState, side: SideId, target: &str) -> Vec<BattleCommand>;
}

impl HazardEffect for HazardId {
    fn on_switch_in(&self, state: &BattleState, _side: SideId, target: &str) -> Vec<BattleCommand> {
        let Some(combatant) = state.combatant(target) else {
            return Vec::new();
        };
        let target = target.to_string();
        let triggered = BattleCommand::EmitEvent(BattleEvent::HazardTriggered {
            target: target.clone(),
            hazard: *self,
        });

        match self {
            HazardId::StealthRock => {
                let factor = effectiveness(ElementType::Rock, &combatant.types);
                let amount = (combatant.max_hp() as f64 / 8.0 * factor).floor() as u16;
                if amount == 0 {
                    return Vec::new();
                }
                vec![triggered, BattleCommand::DealDamage { target, amount }]
            }
            HazardId::Spikes if combatant.is_grounded() => vec![
                triggered,
                BattleCommand::DealDamage {
                    target,
                    amount: combatant.max_hp() / 8,
                },
            ],
            // Poison and Steel types are immune and leave the spikes in place
            HazardId::ToxicSpikes
                if combatant.is_grounded()
                    && combatant.status.is_none()
                    && !conditions::is_immune(combatant, StatusId::Poison) =>
            {
                vec![
                    triggered,
                    BattleCommand::InflictStatus {
                        target,
                        status: StatusId::Poison,
                        duration: DurationRoll::Infinite,
                    },
                ]
            }
            HazardId::StickyWeb if combatant.is_grounded() => vec![
                triggered,
                BattleCommand::ChangeStatStage {
                    target,
                    stat: StatType::Speed,
                    delta: -1,
                },
            ],
            _ => Vec::new(),
        }
    }
}

pub trait ScreenEffect {
    fn reduce_damage(&self, move_used: &MoveDescriptor, ctx: &DamageContext) -> f64;
    /// Weather the screen needs in order to be raised.
    fn required_weather(&self) -> Option<WeatherId>;
}

impl ScreenEffect for ScreenId {
    fn reduce_damage(&self, move_used: &MoveDescriptor, ctx: &DamageContext) -> f64 {
        if ctx.critical {
            return 1.0;
        }
        match (self, move_used.category) {
            (ScreenId::Reflect, MoveCategory::Physical)
            | (ScreenId::LightScreen, MoveCategory::Special)
            | (ScreenId::AuroraVeil, MoveCategory::Physical | MoveCategory::Special) => 0.5,
            _ => 1.0,
        }
    }

    fn required_weather(&self) -> Option<WeatherId> {
        match self {
            ScreenId::AuroraVeil => Some(WeatherId::Hail),
            ScreenId::Reflect | ScreenId::LightScreen => None,
        }
    }
}
