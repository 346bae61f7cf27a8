use std::f64::consts::PI;

const MONTHS_PER_YEAR: f64 = 12.0;
const MIN_RETURN: f64 = -0.95;
const MAX_RETURN: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetAssumptions {
    pub mean: f64,
    pub vol: f64,
}

impl AssetAssumptions {
    pub fn monthly_mean(self) -> f64 {
        self.mean / MONTHS_PER_YEAR
    }

    pub fn monthly_vol(self) -> f64 {
        self.vol / MONTHS_PER_YEAR.sqrt()
    }
}

pub struct ReturnGenerator {
    rng: Rng,
    stock: AssetAssumptions,
    bond: AssetAssumptions,
}

impl ReturnGenerator {
    pub fn new(seed: u64, stock: AssetAssumptions, bond: AssetAssumptions) -> Self {
        Self {
            rng: Rng::new(seed),
            stock,
            bond,
        }
    }

    pub fn monthly_stock(&mut self) -> f64 {
        self.draw(self.stock.monthly_mean(), self.stock.monthly_vol())
    }

    pub fn monthly_bond(&mut self) -> f64 {
        self.draw(self.bond.monthly_mean(), self.bond.monthly_vol())
    }

    pub fn annual_stock(&mut self) -> f64 {
        self.draw(self.stock.mean, self.stock.vol)
    }

    pub fn annual_bond(&mut self) -> f64 {
        self.draw(self.bond.mean, self.bond.vol)
    }

    pub fn monthly_blended(&mut self, stock_fraction: f64) -> f64 {
        if stock_fraction >= 1.0 {
            return self.monthly_stock();
        }
        let stock = self.monthly_stock();
        let bond = self.monthly_bond();
        stock_fraction * stock + (1.0 - stock_fraction) * bond
    }

    pub fn annual_blended(&mut self, stock_fraction: f64) -> f64 {
        if stock_fraction >= 1.0 {
            return self.annual_stock();
        }
        let stock = self.annual_stock();
        let bond = self.annual_bond();
        stock_fraction * stock + (1.0 - stock_fraction) * bond
    }

    fn draw(&mut self, mean: f64, stddev: f64) -> f64 {
        (mean + stddev * self.rng.standard_normal()).clamp(MIN_RETURN, MAX_RETURN)
    }
}

pub(crate) fn derive_seed(base_seed: u64, scenario_id: u32, stream: u32) -> u64 {
    let mixed = base_seed ^ ((stream as u64) << 40) ^ scenario_id as u64;
    splitmix64(mixed)
}

pub(crate) fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

pub(crate) struct Rng {
    state: u64,
}

impl Rng {
    pub(crate) fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    pub(crate) fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    pub(crate) fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        r * (2.0 * PI * u2).cos()
    }
}
