use std::time::{Duration, Instant};

use rand::Rng;

/// One duty-cycle period: busy for `cpu_load%` of it, asleep for the rest.
const DUTY_PERIOD: Duration = Duration::from_millis(100);

/// Burn CPU at `cpu_load` percent for `load_time` seconds across `threads`
/// OS threads.
///
/// The busy phase runs a Monte Carlo π estimate, so the work is real
/// floating-point load rather than a spin on a no-op. Returns the pooled
/// estimate; 0.0 if the duration was too short to sample anything.
pub fn generate_cpu_load(cpu_load: f64, load_time: f64, threads: usize) -> f64 {
    let deadline = Instant::now() + Duration::from_secs_f64(load_time.max(0.0));
    let duty = (cpu_load / 100.0).clamp(0.0, 1.0);
    let threads = threads.max(1);

    let handles: Vec<_> = (0..threads)
        .map(|_| std::thread::spawn(move || duty_cycle_loop(deadline, duty)))
        .collect();

    let mut inside: u64 = 0;
    let mut total: u64 = 0;
    for handle in handles {
        if let Ok((i, t)) = handle.join() {
            inside += i;
            total += t;
        }
    }

    if total == 0 {
        return 0.0;
    }
    4.0 * inside as f64 / total as f64
}

/// Alternate busy and sleep phases until the deadline, sampling points in
/// the unit square during the busy phase.
fn duty_cycle_loop(deadline: Instant, duty: f64) -> (u64, u64) {
    let mut rng = rand::thread_rng();
    let mut inside: u64 = 0;
    let mut total: u64 = 0;

    while Instant::now() < deadline {
        let period_start = Instant::now();
        let busy_until = period_start + DUTY_PERIOD.mul_f64(duty);

        loop {
            let now = Instant::now();
            if now >= busy_until || now >= deadline {
                break;
            }
            let x: f64 = rng.gen();
            let y: f64 = rng.gen();
            if (x * x + y * y).sqrt() <= 1.0 {
                inside += 1;
            }
            total += 1;
        }

        let period_end = (period_start + DUTY_PERIOD).min(deadline);
        let now = Instant::now();
        if now < period_end {
            std::thread::sleep(period_end - now);
        }
    }

    (inside, total)
}
