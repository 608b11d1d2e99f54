//! P-256 short-Weierstrass group arithmetic.
//!
//! Affine-coordinate point addition, doubling and double-and-add
//! scalar multiplication over the NIST P-256 curve
//! y^2 = x^3 - 3x + b, built directly on the fixed-capacity bignum
//! layer.  The curve constants are parsed once and cached the same way
//! the capability registry is; a parse failure is a programming error
//! and poisons the cache.

use std::cmp::Ordering;

use lazy_static::lazy_static;

use crate::bignum::{Bignum, KeySizeCheck};
use crate::constants::MIN_PKCSIZE_ECC_THRESHOLD;
use crate::context::{ContextInfo, PkcInfo};
use crate::error::{ErrorKind, Result};
use crate::keyload::EccComponents;

// NIST P-256 (secp256r1) domain parameters; a = -3 is implicit in the
// formulas.
const P256_P: &str = "FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF";
const P256_B: &str = "5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B";
const P256_N: &str = "FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551";
const P256_GX: &str = "6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296";
const P256_GY: &str = "4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5";

/// An affine curve point, with the point at infinity carried as an
/// explicit flag.
#[derive(Clone)]
pub(crate) struct Point {
    pub x: Bignum,
    pub y: Bignum,
    pub infinity: bool,
}

impl Point {
    pub fn infinity() -> Point {
        Point {
            x: Bignum::new(),
            y: Bignum::new(),
            infinity: true,
        }
    }

    pub fn new(x: Bignum, y: Bignum) -> Point {
        Point {
            x,
            y,
            infinity: false,
        }
    }
}

/// The cached curve: field prime, curve constant, group order and base
/// point.
pub(crate) struct Curve {
    pub p: Bignum,
    pub b: Bignum,
    pub n: Bignum,
    gx: Bignum,
    gy: Bignum,
}

fn parse_const(s: &str) -> Result<Bignum> {
    let mut buf = [0u8; 32];
    let len = crate::hash::hex_decode(s, &mut buf)?;
    Bignum::from_bytes(&buf[..len])
}

fn build_p256() -> Result<Curve> {
    Ok(Curve {
        p: parse_const(P256_P)?,
        b: parse_const(P256_B)?,
        n: parse_const(P256_N)?,
        gx: parse_const(P256_GX)?,
        gy: parse_const(P256_GY)?,
    })
}

lazy_static! {
    static ref P256: Result<Curve> = build_p256();
}

/// The P-256 curve singleton.
pub(crate) fn p256() -> Result<&'static Curve> {
    match &*P256 {
        Ok(curve) => Ok(curve),
        Err(e) => Err(*e),
    }
}

impl Curve {
    /// The base point G.
    pub fn generator(&self) -> Point {
        Point::new(self.gx.clone(), self.gy.clone())
    }

    /// Whether a finite point satisfies the curve equation with both
    /// coordinates inside the field.
    pub fn contains(&self, pt: &Point) -> Result<bool> {
        if pt.infinity {
            return Ok(false);
        }
        if pt.x.ucmp(&self.p) != Ordering::Less || pt.y.ucmp(&self.p) != Ordering::Less {
            return Ok(false);
        }
        // y^2 =? (x^2 - 3) * x + b
        let mut lhs = Bignum::new();
        lhs.set_mod_mul(&pt.y, &pt.y, &self.p)?;
        let mut t = Bignum::new();
        t.set_mod_mul(&pt.x, &pt.x, &self.p)?;
        let mut u = Bignum::new();
        u.set_sub(&t, &Bignum::from_word(3))?;
        t.set_mod(&u, &self.p)?;
        let mut rhs = Bignum::new();
        rhs.set_mod_mul(&t, &pt.x, &self.p)?;
        u.set_add(&rhs, &self.b)?;
        rhs.set_mod(&u, &self.p)?;
        Ok(lhs == rhs)
    }

    // Chord-slope addition of two distinct finite points.
    fn add_distinct(&self, a: &Point, b: &Point) -> Result<Point> {
        let mut num = Bignum::new();
        let mut den = Bignum::new();
        let mut t = Bignum::new();
        t.set_sub(&b.y, &a.y)?;
        num.set_mod(&t, &self.p)?;
        t.set_sub(&b.x, &a.x)?;
        den.set_mod(&t, &self.p)?;
        let mut lambda = Bignum::new();
        t.set_mod_inverse(&den, &self.p)?;
        lambda.set_mod_mul(&num, &t, &self.p)?;
        self.complete_affine(&lambda, a, &b.x)
    }

    // Tangent-slope doubling of a finite point with y != 0.
    fn double(&self, a: &Point) -> Result<Point> {
        // lambda = (3x^2 - 3) / 2y for a = -3.
        let mut t = Bignum::new();
        t.set_mod_mul(&a.x, &a.x, &self.p)?;
        t.mul_word_assign(3)?;
        let mut u = Bignum::new();
        u.set_sub(&t, &Bignum::from_word(3))?;
        let mut num = Bignum::new();
        num.set_mod(&u, &self.p)?;
        let mut den = Bignum::new();
        t.set_add(&a.y, &a.y)?;
        den.set_mod(&t, &self.p)?;
        let mut lambda = Bignum::new();
        t.set_mod_inverse(&den, &self.p)?;
        lambda.set_mod_mul(&num, &t, &self.p)?;
        self.complete_affine(&lambda, a, &a.x)
    }

    // Shared tail: x3 = lambda^2 - x1 - x2, y3 = lambda(x1 - x3) - y1.
    fn complete_affine(&self, lambda: &Bignum, a: &Point, x2: &Bignum) -> Result<Point> {
        let mut t = Bignum::new();
        t.set_mod_mul(lambda, lambda, &self.p)?;
        t.sub_assign(&a.x)?;
        t.sub_assign(x2)?;
        let mut x3 = Bignum::new();
        x3.set_mod(&t, &self.p)?;
        t.set_sub(&a.x, &x3)?;
        let mut u = Bignum::new();
        u.set_mod(&t, &self.p)?;
        t.set_mod_mul(lambda, &u, &self.p)?;
        t.sub_assign(&a.y)?;
        let mut y3 = Bignum::new();
        y3.set_mod(&t, &self.p)?;
        Ok(Point::new(x3, y3))
    }

    /// Full addition law, covering infinity, doubling and inverse
    /// pairs.
    pub fn add(&self, a: &Point, b: &Point) -> Result<Point> {
        if a.infinity {
            return Ok(b.clone());
        }
        if b.infinity {
            return Ok(a.clone());
        }
        if a.x == b.x {
            if a.y == b.y && !a.y.is_zero() {
                return self.double(a);
            }
            // b = -a, or a point of order two.
            return Ok(Point::infinity());
        }
        self.add_distinct(a, b)
    }

    /// `k * pt` by most-significant-bit-first double-and-add.
    pub fn scalar_mul(&self, k: &Bignum, pt: &Point) -> Result<Point> {
        let mut acc = Point::infinity();
        for i in (0..k.bit_count()).rev() {
            if !acc.infinity {
                acc = if acc.y.is_zero() {
                    Point::infinity()
                } else {
                    self.double(&acc)?
                };
            }
            if k.bit(i) {
                acc = self.add(&acc, pt)?;
            }
        }
        Ok(acc)
    }

    /// `u1 * G + u2 * Q`, the signature-verification combination.
    pub fn mul_add(&self, u1: &Bignum, u2: &Bignum, q: &Point) -> Result<Point> {
        let a = self.scalar_mul(u1, &self.generator())?;
        let b = self.scalar_mul(u2, q)?;
        self.add(&a, &b)
    }
}

/// Field element size for the carried curve, in bytes.
pub(crate) const P256_SIZE: usize = 32;

/// Imports ECC components into the context's parameter slots:
/// qx, qy, d in param1..param3.
pub(crate) fn import_ecc_components(pkc: &mut PkcInfo, c: &EccComponents) -> Result<()> {
    let curve = p256()?;
    if !c.qx.is_empty() {
        pkc.param1 =
            Bignum::from_bytes_checked(&c.qx, 1, P256_SIZE, Some(&curve.p), KeySizeCheck::None)?;
        pkc.param2 =
            Bignum::from_bytes_checked(&c.qy, 1, P256_SIZE, Some(&curve.p), KeySizeCheck::None)?;
    }
    if !c.d.is_empty() {
        pkc.param3 = Bignum::from_bytes_checked(
            &c.d,
            MIN_PKCSIZE_ECC_THRESHOLD,
            P256_SIZE,
            Some(&curve.n),
            KeySizeCheck::Ecc,
        )?;
    }
    Ok(())
}

/// Validates the loaded key values, derives the public point when only
/// the private scalar was supplied, and binds the checksum.  Called
/// both after a component load and after native generation.
pub(crate) fn init_ecc_key(ctx: &mut ContextInfo) -> Result<()> {
    let algo = ctx.capability.algo;
    let curve = p256()?;
    let pkc = ctx.pkc_mut()?;
    let private;
    {
        let PkcInfo {
            param1: qx,
            param2: qy,
            param3: d,
            key_size_bits,
            ..
        } = &mut *pkc;

        *key_size_bits = curve.p.bit_count();
        private = !d.is_zero();
        if private {
            // Derive Q = dG, or verify a supplied Q against it.
            let derived = curve.scalar_mul(d, &curve.generator())?;
            if derived.infinity {
                return Err(ErrorKind::BadData.into());
            }
            if qx.is_zero() && qy.is_zero() {
                qx.copy_from(&derived.x);
                qy.copy_from(&derived.y);
            } else if *qx != derived.x || *qy != derived.y {
                return Err(ErrorKind::BadData.into());
            }
        } else {
            if qx.is_zero() && qy.is_zero() {
                return Err(ErrorKind::BadData.into());
            }
            let q = Point::new(qx.clone(), qy.clone());
            if !curve.contains(&q)? {
                return Err(ErrorKind::BadData.into());
            }
            // The point must have order n, not lie in a small cofactor
            // subgroup; for a cofactor-one curve nQ = infinity suffices.
            if !curve.scalar_mul(&curve.n, &q)?.infinity {
                return Err(ErrorKind::BadData.into());
            }
        }
    }
    pkc.update_checksum(algo, private);
    Ok(())
}

/// Generates a native P-256 key pair.  The private scalar lands in
/// param3 and `init_ecc_key` derives the public point.
pub(crate) fn generate_ecc_key(ctx: &mut ContextInfo) -> Result<()> {
    let curve = p256()?;
    {
        let pkc = ctx.pkc_mut()?;
        let PkcInfo {
            param1: qx,
            param2: qy,
            param3: d,
            ..
        } = &mut *pkc;
        loop {
            d.set_random_bits(curve.n.bit_count())?;
            if d.cmp_word(2) != Ordering::Less && d.ucmp(&curve.n) == Ordering::Less {
                break;
            }
        }
        // Q is derived inside init_ecc_key.
        qx.set_zero();
        qy.set_zero();
    }
    init_ecc_key(ctx)
}

// X9.62 L.4.2 P-256 sample key, shared by the ECC self-tests.
pub(crate) mod test_key {
    pub const QX: &str = "596375E6CE57E0F20294FC46BDFCFD19A39F8161B58695B3EC5B3D16427C274D";
    pub const QY: &str = "42754DFD25C56F939A79F2B204876B3A3AB1CEB2E4FF571ABF4FBF36326C8B27";
    pub const D: &str = "2CA1411A41B17B24CC8C3B089CFD033F1920202A6C0DE8ABB97DF1498D50D2C8";
}

/// Loads the X9.62 test key into an ECC context, with or without the
/// private scalar.
pub(crate) fn load_test_key(ctx: &mut ContextInfo, private: bool) -> Result<()> {
    let mut c = EccComponents::default();
    c.qx = crate::dlp::test_key_bytes(test_key::QX)?;
    c.qy = crate::dlp::test_key_bytes(test_key::QY)?;
    if private {
        c.d = crate::dlp::test_key_bytes(test_key::D)?;
    }
    ctx.load_key_components(&crate::keyload::PkcComponents::Ecc(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_on_curve() {
        let curve = p256().unwrap();
        assert!(curve.contains(&curve.generator()).unwrap());
        assert!(!curve.contains(&Point::infinity()).unwrap());
    }

    #[test]
    fn test_off_curve_point_rejected() {
        let curve = p256().unwrap();
        let mut pt = curve.generator();
        pt.x.add_word_assign(1).unwrap();
        assert!(!curve.contains(&pt).unwrap());
    }

    #[test]
    fn test_double_matches_repeated_add() {
        let curve = p256().unwrap();
        let g = curve.generator();
        let two_g = curve.add(&g, &g).unwrap();
        let three_g = curve.add(&two_g, &g).unwrap();
        let k3 = curve.scalar_mul(&Bignum::from_word(3), &g).unwrap();
        assert!(three_g.x == k3.x && three_g.y == k3.y);
        assert!(curve.contains(&three_g).unwrap());
    }

    #[test]
    fn test_order_annihilates_generator() {
        let curve = p256().unwrap();
        let result = curve.scalar_mul(&curve.n, &curve.generator()).unwrap();
        assert!(result.infinity);
    }

    #[test]
    fn test_inverse_pair_sums_to_infinity() {
        let curve = p256().unwrap();
        let g = curve.generator();
        let mut neg = g.clone();
        let mut t = Bignum::new();
        t.set_sub(&curve.p, &g.y).unwrap();
        neg.y = t;
        let sum = curve.add(&g, &neg).unwrap();
        assert!(sum.infinity);
    }

    #[test]
    fn test_private_load_derives_matching_public_point() {
        use crate::capability::Algorithm;

        let mut ctx = ContextInfo::new(Algorithm::Ecdsa).unwrap();
        let mut c = EccComponents::default();
        c.d = crate::dlp::test_key_bytes(test_key::D).unwrap();
        ctx.load_key_components(&crate::keyload::PkcComponents::Ecc(c))
            .unwrap();
        let pkc = ctx.pkc().unwrap();
        let qx = Bignum::from_bytes(&crate::dlp::test_key_bytes(test_key::QX).unwrap()).unwrap();
        let qy = Bignum::from_bytes(&crate::dlp::test_key_bytes(test_key::QY).unwrap()).unwrap();
        assert!(pkc.param1 == qx && pkc.param2 == qy);
        assert_eq!(pkc.key_size_bits, 256);
    }

    #[test]
    fn test_mismatched_public_point_rejected() {
        use crate::capability::Algorithm;

        let mut ctx = ContextInfo::new(Algorithm::Ecdsa).unwrap();
        let mut qx = crate::dlp::test_key_bytes(test_key::QX).unwrap();
        qx[7] ^= 0x04;
        let c = EccComponents {
            qx,
            qy: crate::dlp::test_key_bytes(test_key::QY).unwrap(),
            d: crate::dlp::test_key_bytes(test_key::D).unwrap(),
        };
        assert!(ctx
            .load_key_components(&crate::keyload::PkcComponents::Ecc(c))
            .is_err());
    }

    #[test]
    fn test_generated_key_is_on_curve() {
        use crate::capability::Algorithm;

        let mut ctx = ContextInfo::new(Algorithm::Ecdsa).unwrap();
        ctx.generate_key().unwrap();
        let pkc = ctx.pkc().unwrap();
        let curve = p256().unwrap();
        let q = Point::new(pkc.param1.clone(), pkc.param2.clone());
        assert!(curve.contains(&q).unwrap());
        pkc.verify_checksum(Algorithm::Ecdsa, true).unwrap();
    }

    #[test]
    fn test_scalar_mul_known_point() {
        // 2G for P-256 has a published value.
        let curve = p256().unwrap();
        let two_g = curve.scalar_mul(&Bignum::from_word(2), &curve.generator()).unwrap();
        let expected_x =
            parse_const("7CF27B188D034F7E8A52380304B51AC3C08969E277F21B35A60B48FC47669978")
                .unwrap();
        let expected_y =
            parse_const("07775510DB8ED040293D9AC69F7430DBBA7DADE63CE982299E04B79D227873D1")
                .unwrap();
        assert!(two_g.x == expected_x && two_g.y == expected_y);
    }
}
