use serde::{Deserialize, Serialize};

use crate::config::PointsConfig;
use crate::lifecycle::Mutation;

/// Team a participant played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Terrorist,
    CounterTerrorist,
}

/// Events reported by the game server.
///
/// Connect, disconnect and shutdown drive the record lifecycle; every other
/// event is translated into mutations through `mutations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    Connect {
        identity: String,
        display_name: String,
    },
    Disconnect {
        identity: String,
    },
    /// `killer` is `None` for world kills (fall damage, bomb).
    Kill {
        killer: Option<String>,
        victim: String,
        weapon: String,
        headshot: bool,
        teamkill: bool,
    },
    Assist {
        identity: String,
    },
    Shot {
        identity: String,
        weapon: String,
    },
    Hit {
        identity: String,
        weapon: String,
        region: i32,
        health_damage: i32,
        armor_damage: i32,
    },
    /// `winning_side` is `None` for a draw.
    RoundEnd {
        winning_side: Option<Side>,
        participants: Vec<(String, Side)>,
    },
    MatchEnd {
        winning_side: Option<Side>,
        participants: Vec<(String, Side)>,
    },
    ServerShutdown,
}

impl GameEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::Connect { .. } => "connect",
            GameEvent::Disconnect { .. } => "disconnect",
            GameEvent::Kill { .. } => "kill",
            GameEvent::Assist { .. } => "assist",
            GameEvent::Shot { .. } => "shot",
            GameEvent::Hit { .. } => "hit",
            GameEvent::RoundEnd { .. } => "round_end",
            GameEvent::MatchEnd { .. } => "match_end",
            GameEvent::ServerShutdown => "server_shutdown",
        }
    }

    /// Mutations this event causes, per identity, in application order.
    /// Lifecycle events produce none.
    pub fn mutations(&self, points: &PointsConfig) -> Vec<(String, Mutation)> {
        let mut out = Vec::new();
        match self {
            GameEvent::Connect { .. }
            | GameEvent::Disconnect { .. }
            | GameEvent::ServerShutdown => {}

            GameEvent::Kill {
                killer,
                victim,
                weapon,
                headshot,
                teamkill,
            } => {
                let suicide = killer.as_deref().map_or(true, |killer| killer == victim.as_str());
                let mut push = |identity: &str, mutation: Mutation| {
                    out.push((identity.to_string(), mutation));
                };

                push(victim.as_str(), Mutation::Death);
                push(victim.as_str(), Mutation::WeaponDeath { weapon: weapon.clone() });
                if suicide {
                    push_points(&mut push, victim, points.suicide, "suicide");
                } else {
                    push_points(&mut push, victim, points.death, "death");
                }

                if let Some(killer) = killer.as_deref().filter(|_| !suicide) {
                    if *teamkill {
                        push_points(&mut push, killer, points.teamkill, "teamkill");
                    } else {
                        push(killer, Mutation::Kill { headshot: *headshot });
                        push(
                            killer,
                            Mutation::WeaponKill {
                                weapon: weapon.clone(),
                                headshot: *headshot,
                            },
                        );
                        push_points(&mut push, killer, points.kill, "kill");
                        if *headshot {
                            push_points(&mut push, killer, points.headshot, "headshot");
                        }
                    }
                }
            }

            GameEvent::Assist { identity } => {
                out.push((identity.clone(), Mutation::Assist));
                if points.assist != 0 {
                    out.push((identity.clone(), Mutation::add_points(points.assist, "assist")));
                }
            }

            GameEvent::Shot { identity, weapon } => {
                out.push((identity.clone(), Mutation::Shot));
                out.push((
                    identity.clone(),
                    Mutation::WeaponShot {
                        weapon: weapon.clone(),
                    },
                ));
            }

            GameEvent::Hit {
                identity,
                weapon,
                region,
                health_damage,
                armor_damage,
            } => {
                out.push((
                    identity.clone(),
                    Mutation::Hit {
                        region: *region,
                        health_damage: *health_damage,
                        armor_damage: *armor_damage,
                    },
                ));
                out.push((
                    identity.clone(),
                    Mutation::WeaponHit {
                        weapon: weapon.clone(),
                        damage: *health_damage,
                    },
                ));
            }

            GameEvent::RoundEnd {
                winning_side,
                participants,
            } => {
                for (identity, side) in participants {
                    if let Some(winner) = winning_side {
                        let won = side == winner;
                        out.push((identity.clone(), Mutation::RoundResult { won }));
                        let (delta, reason) = if won {
                            (points.round_win, "round_win")
                        } else {
                            (points.round_lose, "round_lose")
                        };
                        if delta != 0 {
                            out.push((identity.clone(), Mutation::add_points(delta, reason)));
                        }
                    }
                    out.push((identity.clone(), Mutation::ResetRoundScoped));
                }
            }

            GameEvent::MatchEnd {
                winning_side: Some(winner),
                participants,
            } => {
                for (identity, side) in participants {
                    let won = side == winner;
                    out.push((identity.clone(), Mutation::GameResult { won }));
                    let (delta, reason) = if won {
                        (points.game_win, "game_win")
                    } else {
                        (points.game_lose, "game_lose")
                    };
                    if delta != 0 {
                        out.push((identity.clone(), Mutation::add_points(delta, reason)));
                    }
                }
            }
            GameEvent::MatchEnd { winning_side: None, .. } => {}
        }
        out
    }
}

fn push_points(push: &mut impl FnMut(&str, Mutation), identity: &str, delta: i32, reason: &str) {
    if delta != 0 {
        push(identity, Mutation::add_points(delta, reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kill(killer: Option<&str>, victim: &str, headshot: bool, teamkill: bool) -> GameEvent {
        GameEvent::Kill {
            killer: killer.map(str::to_string),
            victim: victim.to_string(),
            weapon: "ak47".to_string(),
            headshot,
            teamkill,
        }
    }

    fn points_for(mutations: &[(String, Mutation)], identity: &str) -> i32 {
        mutations
            .iter()
            .filter(|(id, _)| id == identity)
            .map(|(_, mutation)| match mutation {
                Mutation::AddPoints { delta, .. } => *delta,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn headshot_kill_awards_killer_and_penalizes_victim() {
        let points = PointsConfig::default();
        let mutations = kill(Some("a"), "b", true, false).mutations(&points);

        assert_eq!(points_for(&mutations, "a"), points.kill + points.headshot);
        assert_eq!(points_for(&mutations, "b"), points.death);
        assert!(mutations.contains(&("a".to_string(), Mutation::Kill { headshot: true })));
        assert!(mutations.contains(&("b".to_string(), Mutation::Death)));
    }

    #[test]
    fn suicide_and_world_kill_only_touch_victim() {
        let points = PointsConfig::default();
        for event in [kill(Some("a"), "a", false, false), kill(None, "a", false, false)] {
            let mutations = event.mutations(&points);
            assert!(mutations.iter().all(|(id, _)| id == "a"));
            assert_eq!(points_for(&mutations, "a"), points.suicide);
            assert!(!mutations.iter().any(|(_, m)| matches!(m, Mutation::Kill { .. })));
        }
    }

    #[test]
    fn teamkill_penalizes_without_counting_a_kill() {
        let points = PointsConfig::default();
        let mutations = kill(Some("a"), "b", false, true).mutations(&points);

        assert_eq!(points_for(&mutations, "a"), points.teamkill);
        assert!(!mutations
            .iter()
            .any(|(id, m)| id == "a" && matches!(m, Mutation::Kill { .. })));
    }

    #[test]
    fn round_end_rewards_by_side_and_resets_round_state() {
        let points = PointsConfig::default();
        let event = GameEvent::RoundEnd {
            winning_side: Some(Side::CounterTerrorist),
            participants: vec![
                ("ct".to_string(), Side::CounterTerrorist),
                ("t".to_string(), Side::Terrorist),
            ],
        };
        let mutations = event.mutations(&points);

        assert_eq!(points_for(&mutations, "ct"), points.round_win);
        assert_eq!(points_for(&mutations, "t"), points.round_lose);
        assert_eq!(
            mutations.last(),
            Some(&("t".to_string(), Mutation::ResetRoundScoped))
        );
    }

    #[test]
    fn drawn_round_only_resets_round_state() {
        let event = GameEvent::RoundEnd {
            winning_side: None,
            participants: vec![("x".to_string(), Side::Terrorist)],
        };
        assert_eq!(
            event.mutations(&PointsConfig::default()),
            vec![("x".to_string(), Mutation::ResetRoundScoped)]
        );
    }

    #[test]
    fn lifecycle_events_produce_no_mutations() {
        let points = PointsConfig::default();
        assert!(GameEvent::ServerShutdown.mutations(&points).is_empty());
        assert!(GameEvent::Disconnect {
            identity: "a".into()
        }
        .mutations(&points)
        .is_empty());
    }
}
