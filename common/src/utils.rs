use rand::Rng;
use rand::random;

pub fn random_bool_by_given_probability(probability: f32) -> bool {
    let rand_value: f32 = random();
    rand_value < probability
}

/// `base` plus up to 50% random jitter, in milliseconds.
pub fn jittered_delay_millis(base: u64) -> u64 {
    let jitter = rand::thread_rng().gen_range(0..=base / 2);
    base + jitter
}

pub fn print_welcome_message() {
    println!("==============================================");
    println!("      Scrap pickup tracking (demo client)     ");
    println!("==============================================");
}
