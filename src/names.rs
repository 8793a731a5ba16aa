//! Nickname and team name pools for registration and pairing.

use rand::seq::IndexedRandom;

pub const WEDDING_NICKNAMES: &[&str] = &[
    "Best Man",
    "Bridesmaid",
    "Ring Bearer",
    "Flower Scatterer",
    "Dream In-Law",
    "Cake Guardian",
    "Champagne Popper",
    "Rice Thrower",
    "Bouquet Catcher",
    "Toast Master",
    "Dance King",
    "Wine Taster",
    "Photo Bomber",
    "Party Animal",
    "Veil Keeper",
    "Groom's Sidekick",
    "Wedding DJ",
    "Cake Sampler",
    "Garter Hunter",
    "First Dance Critic",
];

pub const TEAM_NAMES: &[&str] = &[
    "Tulle Commandos",
    "Bow Tie Mafia",
    "Wedding Llamas",
    "Lords of the Rings",
    "Bride Ransom Gang",
    "Champagne Poppers",
    "Cake Squad",
    "Champions of I Do",
    "Bouquet Brigade",
    "Masters of Rice",
    "Hussars of Marriage",
    "Party Pyramids",
    "Wedding Elite",
    "Bridal Mafia",
    "Groom Vikings",
    "Reception Legends",
];

/// Pick a random entry from `pool` that is not in `used`.
///
/// Falls back to a generated pet name once the pool is exhausted.
pub fn pick_unused(pool: &[&str], used: &[String]) -> String {
    let mut rng = rand::rng();
    let available: Vec<&str> = pool
        .iter()
        .copied()
        .filter(|name| !used.iter().any(|u| u == name))
        .collect();

    if let Some(name) = available.choose(&mut rng) {
        return (*name).to_string();
    }

    petname::petname(2, " ")
        .or_else(|| pool.choose(&mut rng).map(|s| s.to_string()))
        .unwrap_or_else(|| "Guest".to_string())
}
