//! `Dice.roll`: tabletop dice in `NdM[+K]` notation.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roleplayer_core::{Action, ActionError, ResultItem};
use serde_json::Value;

pub const NAME: &str = "Dice.roll";

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;
const MAX_MODIFIER: i64 = 10_000;

/// A parsed roll such as `3d6-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notation {
    pub count: u32,
    pub sides: u32,
    pub modifier: i64,
}

impl std::str::FromStr for Notation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let lower = compact.to_ascii_lowercase();
        let bad = || format!("bad dice notation '{s}', expected NdM or NdM+K");

        let (count, rest) = lower.split_once('d').ok_or_else(bad)?;
        let count = if count.is_empty() {
            1
        } else {
            count.parse::<u32>().map_err(|_| bad())?
        };

        let (sides, modifier) = match rest.find(['+', '-']) {
            Some(at) => {
                let modifier = rest[at..].parse::<i64>().map_err(|_| bad())?;
                (&rest[..at], modifier)
            }
            None => (rest, 0),
        };
        let sides = sides.parse::<u32>().map_err(|_| bad())?;

        if count == 0 || count > MAX_DICE {
            return Err(format!("dice count must be between 1 and {MAX_DICE}"));
        }
        if !(2..=MAX_SIDES).contains(&sides) {
            return Err(format!("dice must have between 2 and {MAX_SIDES} sides"));
        }
        if modifier.unsigned_abs() > MAX_MODIFIER.unsigned_abs() {
            return Err(format!("modifier must be between -{MAX_MODIFIER} and +{MAX_MODIFIER}"));
        }

        Ok(Notation {
            count,
            sides,
            modifier,
        })
    }
}

impl std::fmt::Display for Notation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

pub struct Dice {
    rng: Mutex<StdRng>,
}

impl Dice {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic rolls.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Roll each die and report `notation: [rolls] +K = total`.
    pub fn roll(&self, notation: Notation) -> Result<String, ActionError> {
        let mut rng = self.rng.lock().map_err(|_| ActionError::ExecutionFailed {
            action: NAME.into(),
            reason: "random number generator poisoned".into(),
        })?;
        let rolls: Vec<u32> = (0..notation.count)
            .map(|_| rng.random_range(1..=notation.sides))
            .collect();
        let total = rolls
            .iter()
            .map(|&r| i64::from(r))
            .sum::<i64>()
            .checked_add(notation.modifier)
            .ok_or_else(|| {
                ActionError::InvalidArguments(format!("modifier {} is out of range", notation.modifier))
            })?;

        let listed = rolls
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let modifier = match notation.modifier {
            0 => String::new(),
            m if m > 0 => format!(" +{m}"),
            m => format!(" {m}"),
        };
        Ok(format!("{notation}: [{listed}]{modifier} = {total}"))
    }
}

impl Default for Dice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for Dice {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Roll tabletop dice. Use notation like '2d6', 'd20' or '3d8+2'."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!([{
            "name": "notation",
            "type": "STRING",
            "description": "Dice notation NdM[+K]"
        }])
    }

    fn required(&self) -> Vec<String> {
        vec!["notation".into()]
    }

    async fn run(&self, parameters: Value) -> Result<Vec<ResultItem>, ActionError> {
        let notation: Notation = parameters
            .get("notation")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::InvalidArguments("missing 'notation'".into()))?
            .parse()
            .map_err(ActionError::InvalidArguments)?;

        Ok(vec![ResultItem::text(self.roll(notation)?)])
    }
}
