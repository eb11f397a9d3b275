//! Round scoring. Every function here is pure; folding the result into cumulative
//! scores happens once, in [`crate::state::game::Session::apply_outcome`].

use indexmap::IndexMap;

use crate::{
    services::voting_service,
    state::game::{Ballot, Confidence, RoundOutcome, RoundState, ScoreLine, ScoreReason},
};

/// Extra points for an impostor whose all-in vote convicted an innocent.
pub const DOUBLE_AGENT_BONUS: i32 = 10;
/// Points for naming the location.
pub const LOCATION_GUESS_REWARD: i32 = 10;

/// Points for a vote, independent of the conviction outcome: the wager doubled when
/// the target is the impostor, the wager lost otherwise.
pub fn vote_points(correct: bool, confidence: Confidence) -> i32 {
    let wager = i32::from(confidence.level());
    if correct { wager * 2 } else { -wager }
}

/// Bonus owed to the impostor for their own ballot.
pub fn double_agent_bonus(ballot: &Ballot, convicted: Option<&str>) -> i32 {
    match (ballot, convicted) {
        (
            Ballot::Vote {
                target,
                confidence: Confidence::AllIn,
            },
            Some(convicted),
        ) if target == convicted => DOUBLE_AGENT_BONUS,
        _ => 0,
    }
}

/// Score one ballot.
pub fn score_ballot(
    voter: &str,
    ballot: &Ballot,
    impostor: &str,
    convicted: Option<&str>,
) -> ScoreLine {
    match ballot {
        Ballot::Abstain => ScoreLine {
            points: 0,
            bonus: 0,
            reason: ScoreReason::Abstained,
        },
        Ballot::Vote { target, confidence } => {
            let correct = target == impostor;
            ScoreLine {
                points: vote_points(correct, *confidence),
                bonus: if voter == impostor {
                    double_agent_bonus(ballot, convicted)
                } else {
                    0
                },
                reason: if correct {
                    ScoreReason::CorrectVote
                } else {
                    ScoreReason::IncorrectVote
                },
            }
        }
    }
}

/// Resolve the round once voting has closed. A location guess takes precedence over
/// the ballots: only the impostor scores and nobody is convicted.
pub fn resolve(round: &RoundState, roster: &[String]) -> RoundOutcome {
    if let Some(guess) = round.guess.clone() {
        let lines = roster
            .iter()
            .map(|name| {
                let line = if *name == round.impostor {
                    ScoreLine {
                        points: if guess.correct { LOCATION_GUESS_REWARD } else { 0 },
                        bonus: 0,
                        reason: if guess.correct {
                            ScoreReason::LocationGuessed
                        } else {
                            ScoreReason::LocationMissed
                        },
                    }
                } else {
                    ScoreLine {
                        points: 0,
                        bonus: 0,
                        reason: ScoreReason::Unscored,
                    }
                };
                (name.clone(), line)
            })
            .collect();
        return RoundOutcome {
            convicted: None,
            tally: IndexMap::new(),
            impostor_caught: false,
            guess: Some(guess),
            lines,
        };
    }

    let tally = voting_service::tally(&round.ballots);
    let convicted = voting_service::convict(&tally);
    let lines = roster
        .iter()
        .map(|name| {
            let line = match round.ballots.get(name) {
                Some(ballot) => score_ballot(name, ballot, &round.impostor, convicted.as_deref()),
                None => score_ballot(name, &Ballot::Abstain, &round.impostor, None),
            };
            (name.clone(), line)
        })
        .collect();

    RoundOutcome {
        impostor_caught: convicted.as_deref() == Some(round.impostor.as_str()),
        convicted,
        tally,
        guess: None,
        lines,
    }
}
