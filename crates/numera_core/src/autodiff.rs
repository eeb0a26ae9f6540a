use num_traits::{Float, FromPrimitive, Num, NumCast, One, ToPrimitive, Zero};
use std::f64::consts::{LN_10, LN_2};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Rem, RemAssign, Sub, SubAssign,
};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A variable seeded with unit tangent.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }

    /// Applies g with g(val) = `value`, g'(val) = `d1`.
    fn chain(self, value: f64, d1: f64) -> Self {
        Self::new(value, d1 * self.eps)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // d(a % b)/da = 1 away from the jumps.
        Self::new(self.val % rhs.val, self.eps)
    }
}

impl AddAssign for Dual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for Dual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for Dual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for Dual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for Dual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for Dual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl ToPrimitive for Dual {
    fn to_i64(&self) -> Option<i64> {
        self.val.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.val.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.val)
    }
}

impl FromPrimitive for Dual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for Dual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for Dual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.val.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.val.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.val.is_finite()
    }
    fn is_normal(self) -> bool {
        self.val.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.val.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.val.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.val.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.val.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.val.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.val.fract(), self.eps)
    }
    fn abs(self) -> Self {
        Self::new(
            self.val.abs(),
            if self.val >= 0.0 { self.eps } else { -self.eps },
        )
    }
    fn signum(self) -> Self {
        Self::constant(self.val.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.val.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.val.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        Self::one() / self
    }

    fn powi(self, n: i32) -> Self {
        if n == 0 {
            return Self::one();
        }
        self.chain(self.val.powi(n), (n as f64) * self.val.powi(n - 1))
    }

    fn powf(self, n: Self) -> Self {
        let val_pow = self.val.powf(n.val);
        if n.eps == 0.0 {
            // Constant exponent: keeps negative bases finite.
            return self.chain(val_pow, n.val * self.val.powf(n.val - 1.0));
        }
        // x^y = exp(y * ln(x))
        let eps_new = val_pow * (n.eps * self.val.ln() + n.val * self.eps / self.val);
        Self::new(val_pow, eps_new)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.eps)
    }

    fn exp2(self) -> Self {
        let e = self.val.exp2();
        self.chain(e, e * LN_2)
    }
    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        self.chain(self.val.log2(), 1.0 / (self.val * LN_2))
    }
    fn log10(self) -> Self {
        self.chain(self.val.log10(), 1.0 / (self.val * LN_10))
    }

    fn max(self, other: Self) -> Self {
        if self.val > other.val {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.val < other.val {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        (self - other).max(Self::zero())
    }

    fn cbrt(self) -> Self {
        let c = self.val.cbrt();
        self.chain(c, 1.0 / (3.0 * c * c))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        Self::new(self.val.sin(), self.eps * self.val.cos())
    }
    fn cos(self) -> Self {
        Self::new(self.val.cos(), -self.eps * self.val.sin())
    }
    fn tan(self) -> Self {
        let t = self.val.tan();
        Self::new(t, self.eps * (1.0 + t * t))
    }
    fn asin(self) -> Self {
        self.chain(self.val.asin(), 1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn acos(self) -> Self {
        self.chain(self.val.acos(), -1.0 / (1.0 - self.val * self.val).sqrt())
    }
    fn atan(self) -> Self {
        self.chain(self.val.atan(), 1.0 / (1.0 + self.val * self.val))
    }
    fn atan2(self, other: Self) -> Self {
        let denom = self.val * self.val + other.val * other.val;
        Self::new(
            self.val.atan2(other.val),
            (other.val * self.eps - self.val * other.eps) / denom,
        )
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        self.chain(self.val.exp_m1(), self.val.exp())
    }
    fn ln_1p(self) -> Self {
        self.chain(self.val.ln_1p(), 1.0 / (1.0 + self.val))
    }
    fn sinh(self) -> Self {
        self.chain(self.val.sinh(), self.val.cosh())
    }
    fn cosh(self) -> Self {
        self.chain(self.val.cosh(), self.val.sinh())
    }
    fn tanh(self) -> Self {
        let t = self.val.tanh();
        self.chain(t, 1.0 - t * t)
    }
    fn asinh(self) -> Self {
        self.chain(self.val.asinh(), 1.0 / (self.val * self.val + 1.0).sqrt())
    }
    fn acosh(self) -> Self {
        self.chain(self.val.acosh(), 1.0 / (self.val * self.val - 1.0).sqrt())
    }
    fn atanh(self) -> Self {
        self.chain(self.val.atanh(), 1.0 / (1.0 - self.val * self.val))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.val.integer_decode()
    }
}

// --- Hyper-dual numbers ---

/// Hyper-dual number `re + e1·ε₁ + e2·ε₂ + e12·ε₁ε₂` with `ε₁² = ε₂² = 0`.
///
/// Seeding both `e1` and `e2` with a direction `v` makes one evaluation of `f`
/// return `f(x)`, `∇f·v` (in `e1` and `e2`) and `vᵀ∇²f v` (in `e12`), exactly.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HyperDual {
    pub re: f64,
    pub e1: f64,
    pub e2: f64,
    pub e12: f64,
}

impl HyperDual {
    pub fn new(re: f64, e1: f64, e2: f64, e12: f64) -> Self {
        Self { re, e1, e2, e12 }
    }

    pub fn constant(re: f64) -> Self {
        Self::new(re, 0.0, 0.0, 0.0)
    }

    /// Seeds both first-order parts with the same direction component.
    pub fn seeded(re: f64, direction: f64) -> Self {
        Self::new(re, direction, direction, 0.0)
    }

    /// Applies g with g(re) = `value`, g'(re) = `d1`, g''(re) = `d2`.
    fn chain(self, value: f64, d1: f64, d2: f64) -> Self {
        Self::new(
            value,
            d1 * self.e1,
            d1 * self.e2,
            d1 * self.e12 + d2 * self.e1 * self.e2,
        )
    }

    fn has_infinitesimals(&self) -> bool {
        self.e1 != 0.0 || self.e2 != 0.0 || self.e12 != 0.0
    }
}

impl Zero for HyperDual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && !self.has_infinitesimals()
    }
}

impl One for HyperDual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for HyperDual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.re + rhs.re,
            self.e1 + rhs.e1,
            self.e2 + rhs.e2,
            self.e12 + rhs.e12,
        )
    }
}

impl Sub for HyperDual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.re - rhs.re,
            self.e1 - rhs.e1,
            self.e2 - rhs.e2,
            self.e12 - rhs.e12,
        )
    }
}

impl Mul for HyperDual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re,
            self.re * rhs.e1 + self.e1 * rhs.re,
            self.re * rhs.e2 + self.e2 * rhs.re,
            self.re * rhs.e12 + self.e1 * rhs.e2 + self.e2 * rhs.e1 + self.e12 * rhs.re,
        )
    }
}

impl Div for HyperDual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        self * rhs.recip()
    }
}

impl Neg for HyperDual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.re, -self.e1, -self.e2, -self.e12)
    }
}

impl Rem for HyperDual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        Self::new(self.re % rhs.re, self.e1, self.e2, self.e12)
    }
}

impl AddAssign for HyperDual {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl SubAssign for HyperDual {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl MulAssign for HyperDual {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}
impl DivAssign for HyperDual {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}
impl RemAssign for HyperDual {
    fn rem_assign(&mut self, rhs: Self) {
        *self = *self % rhs;
    }
}

impl Num for HyperDual {
    type FromStrRadixErr = ();
    fn from_str_radix(str: &str, radix: u32) -> Result<Self, Self::FromStrRadixErr> {
        f64::from_str_radix(str, radix)
            .map(Self::constant)
            .map_err(|_| ())
    }
}

impl ToPrimitive for HyperDual {
    fn to_i64(&self) -> Option<i64> {
        self.re.to_i64()
    }
    fn to_u64(&self) -> Option<u64> {
        self.re.to_u64()
    }
    fn to_f64(&self) -> Option<f64> {
        Some(self.re)
    }
}

impl FromPrimitive for HyperDual {
    fn from_i64(n: i64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_u64(n: u64) -> Option<Self> {
        Some(Self::constant(n as f64))
    }
    fn from_f64(n: f64) -> Option<Self> {
        Some(Self::constant(n))
    }
}

impl NumCast for HyperDual {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self::constant)
    }
}

impl Float for HyperDual {
    fn nan() -> Self {
        Self::constant(f64::NAN)
    }
    fn infinity() -> Self {
        Self::constant(f64::INFINITY)
    }
    fn neg_infinity() -> Self {
        Self::constant(f64::NEG_INFINITY)
    }
    fn neg_zero() -> Self {
        Self::new(-0.0, -0.0, -0.0, -0.0)
    }
    fn min_value() -> Self {
        Self::constant(f64::MIN)
    }
    fn min_positive_value() -> Self {
        Self::constant(f64::MIN_POSITIVE)
    }
    fn max_value() -> Self {
        Self::constant(f64::MAX)
    }
    fn is_nan(self) -> bool {
        self.re.is_nan()
    }
    fn is_infinite(self) -> bool {
        self.re.is_infinite()
    }
    fn is_finite(self) -> bool {
        self.re.is_finite()
    }
    fn is_normal(self) -> bool {
        self.re.is_normal()
    }
    fn classify(self) -> std::num::FpCategory {
        self.re.classify()
    }
    fn floor(self) -> Self {
        Self::constant(self.re.floor())
    }
    fn ceil(self) -> Self {
        Self::constant(self.re.ceil())
    }
    fn round(self) -> Self {
        Self::constant(self.re.round())
    }
    fn trunc(self) -> Self {
        Self::constant(self.re.trunc())
    }
    fn fract(self) -> Self {
        Self::new(self.re.fract(), self.e1, self.e2, self.e12)
    }
    fn abs(self) -> Self {
        if self.re >= 0.0 {
            self
        } else {
            -self
        }
    }
    fn signum(self) -> Self {
        Self::constant(self.re.signum())
    }
    fn is_sign_positive(self) -> bool {
        self.re.is_sign_positive()
    }
    fn is_sign_negative(self) -> bool {
        self.re.is_sign_negative()
    }
    fn mul_add(self, a: Self, b: Self) -> Self {
        self * a + b
    }
    fn recip(self) -> Self {
        let r = 1.0 / self.re;
        self.chain(r, -r * r, 2.0 * r * r * r)
    }

    fn powi(self, n: i32) -> Self {
        match n {
            0 => Self::one(),
            1 => self,
            _ => {
                let nf = n as f64;
                self.chain(
                    self.re.powi(n),
                    nf * self.re.powi(n - 1),
                    nf * (nf - 1.0) * self.re.powi(n - 2),
                )
            }
        }
    }

    fn powf(self, n: Self) -> Self {
        if !n.has_infinitesimals() {
            let b = n.re;
            return self.chain(
                self.re.powf(b),
                b * self.re.powf(b - 1.0),
                b * (b - 1.0) * self.re.powf(b - 2.0),
            );
        }
        (n * self.ln()).exp()
    }

    fn sqrt(self) -> Self {
        let s = self.re.sqrt();
        self.chain(s, 0.5 / s, -0.25 / (s * s * s))
    }

    fn exp(self) -> Self {
        let e = self.re.exp();
        self.chain(e, e, e)
    }

    fn exp2(self) -> Self {
        let e = self.re.exp2();
        self.chain(e, e * LN_2, e * LN_2 * LN_2)
    }
    fn ln(self) -> Self {
        let r = 1.0 / self.re;
        self.chain(self.re.ln(), r, -r * r)
    }
    fn log(self, base: Self) -> Self {
        self.ln() / base.ln()
    }
    fn log2(self) -> Self {
        let r = 1.0 / self.re;
        self.chain(self.re.log2(), r / LN_2, -r * r / LN_2)
    }
    fn log10(self) -> Self {
        let r = 1.0 / self.re;
        self.chain(self.re.log10(), r / LN_10, -r * r / LN_10)
    }

    fn max(self, other: Self) -> Self {
        if self.re > other.re {
            self
        } else {
            other
        }
    }
    fn min(self, other: Self) -> Self {
        if self.re < other.re {
            self
        } else {
            other
        }
    }

    fn abs_sub(self, other: Self) -> Self {
        (self - other).max(Self::zero())
    }

    fn cbrt(self) -> Self {
        let c = self.re.cbrt();
        self.chain(c, 1.0 / (3.0 * c * c), -2.0 / (9.0 * c.powi(5)))
    }
    fn hypot(self, other: Self) -> Self {
        (self * self + other * other).sqrt()
    }

    fn sin(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(s, c, -s)
    }
    fn cos(self) -> Self {
        let (s, c) = self.re.sin_cos();
        self.chain(c, -s, -c)
    }
    fn tan(self) -> Self {
        let t = self.re.tan();
        let sec2 = 1.0 + t * t;
        self.chain(t, sec2, 2.0 * t * sec2)
    }
    fn asin(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.asin(), 1.0 / q.sqrt(), self.re / q.powf(1.5))
    }
    fn acos(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.acos(), -1.0 / q.sqrt(), -self.re / q.powf(1.5))
    }
    fn atan(self) -> Self {
        let q = 1.0 + self.re * self.re;
        self.chain(self.re.atan(), 1.0 / q, -2.0 * self.re / (q * q))
    }
    fn atan2(self, other: Self) -> Self {
        // Same derivatives as atan(y/x); only the branch of the value differs.
        let base = (self / other).atan();
        Self::new(self.re.atan2(other.re), base.e1, base.e2, base.e12)
    }
    fn sin_cos(self) -> (Self, Self) {
        (self.sin(), self.cos())
    }

    fn exp_m1(self) -> Self {
        let e = self.re.exp();
        self.chain(self.re.exp_m1(), e, e)
    }
    fn ln_1p(self) -> Self {
        let r = 1.0 / (1.0 + self.re);
        self.chain(self.re.ln_1p(), r, -r * r)
    }
    fn sinh(self) -> Self {
        self.chain(self.re.sinh(), self.re.cosh(), self.re.sinh())
    }
    fn cosh(self) -> Self {
        self.chain(self.re.cosh(), self.re.sinh(), self.re.cosh())
    }
    fn tanh(self) -> Self {
        let t = self.re.tanh();
        let sech2 = 1.0 - t * t;
        self.chain(t, sech2, -2.0 * t * sech2)
    }
    fn asinh(self) -> Self {
        let q = self.re * self.re + 1.0;
        self.chain(self.re.asinh(), 1.0 / q.sqrt(), -self.re / q.powf(1.5))
    }
    fn acosh(self) -> Self {
        let q = self.re * self.re - 1.0;
        self.chain(self.re.acosh(), 1.0 / q.sqrt(), -self.re / q.powf(1.5))
    }
    fn atanh(self) -> Self {
        let q = 1.0 - self.re * self.re;
        self.chain(self.re.atanh(), 1.0 / q, 2.0 * self.re / (q * q))
    }

    fn integer_decode(self) -> (u64, i16, i8) {
        self.re.integer_decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn dual_product_rule() {
        let x = Dual::variable(3.0);
        let y = x * x.sin();
        assert_abs_diff_eq!(y.val, 3.0 * 3.0f64.sin());
        assert_abs_diff_eq!(y.eps, 3.0f64.sin() + 3.0 * 3.0f64.cos(), epsilon = 1e-12);
    }

    #[test]
    fn dual_powf_with_constant_exponent_handles_negative_base() {
        let x = Dual::variable(-2.0);
        let y = x.powf(Dual::constant(2.0));
        assert_abs_diff_eq!(y.val, 4.0);
        assert_abs_diff_eq!(y.eps, -4.0);
    }

    #[test]
    fn dual_elementary_derivatives() {
        let x = 0.4;
        let d = |f: fn(Dual) -> Dual| f(Dual::variable(x)).eps;
        assert_abs_diff_eq!(d(|v| v.ln()), 1.0 / x, epsilon = 1e-12);
        assert_abs_diff_eq!(d(|v| v.log10()), 1.0 / (x * LN_10), epsilon = 1e-12);
        assert_abs_diff_eq!(d(|v| v.asin()), 1.0 / (1.0 - x * x).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(d(|v| v.atan()), 1.0 / (1.0 + x * x), epsilon = 1e-12);
        assert_abs_diff_eq!(d(|v| v.tanh()), 1.0 - x.tanh().powi(2), epsilon = 1e-12);
        assert_abs_diff_eq!(d(|v| v.cbrt()), 1.0 / (3.0 * x.cbrt().powi(2)), epsilon = 1e-12);
    }

    #[test]
    fn hyper_dual_gives_second_derivative() {
        // f(x) = x^3 sin(x)
        let x = 0.7f64;
        let h = HyperDual::seeded(x, 1.0);
        let y = h.powi(3) * h.sin();
        let d1 = 3.0 * x * x * x.sin() + x.powi(3) * x.cos();
        let d2 = 6.0 * x * x.sin() + 6.0 * x * x * x.cos() - x.powi(3) * x.sin();
        assert_abs_diff_eq!(y.re, x.powi(3) * x.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(y.e1, d1, epsilon = 1e-12);
        assert_abs_diff_eq!(y.e2, d1, epsilon = 1e-12);
        assert_abs_diff_eq!(y.e12, d2, epsilon = 1e-12);
    }

    #[test]
    fn hyper_dual_quotient_and_exp() {
        // f(x) = exp(x) / x, f'' = exp(x) (x^2 - 2x + 2) / x^3
        let x = 1.3f64;
        let h = HyperDual::seeded(x, 1.0);
        let y = h.exp() / h;
        let expected = x.exp() * (x * x - 2.0 * x + 2.0) / x.powi(3);
        assert_abs_diff_eq!(y.e12, expected, epsilon = 1e-12);
    }

    #[test]
    fn hyper_dual_mixed_partial() {
        // f(x, y) = x * y along v = (1, 1): v^T H v = 2
        let x = HyperDual::seeded(2.0, 1.0);
        let y = HyperDual::seeded(5.0, 1.0);
        let f = x * y;
        assert_abs_diff_eq!(f.e1, 7.0);
        assert_abs_diff_eq!(f.e12, 2.0);
    }
}
