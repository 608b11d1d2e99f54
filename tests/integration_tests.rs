use cryptoctx::attribute::{AttrValue, AttributeId};
use cryptoctx::capability::{CryptMode, DlpParams};
use cryptoctx::{Algorithm, ContextInfo, ErrorKind};

#[test]
fn test_library_self_test() {
    cryptoctx::selftest::self_test_all().expect("self-test failed");
}

#[test]
fn test_aes_cbc_round_trip() {
    let key = [0x2b; 16];
    let iv = [0x5a; 16];
    let plaintext = *b"two famous AES.. blocks of data.";

    let mut enc = ContextInfo::new(Algorithm::Aes).unwrap();
    enc.load_key(&key).unwrap();
    enc.load_iv(&iv).unwrap();
    let mut buf = plaintext;
    enc.encrypt(&mut buf).unwrap();
    assert_ne!(buf, plaintext);

    let mut dec = ContextInfo::new(Algorithm::Aes).unwrap();
    dec.load_key(&key).unwrap();
    dec.load_iv(&iv).unwrap();
    dec.decrypt(&mut buf).unwrap();
    assert_eq!(buf, plaintext);
}

#[test]
fn test_cipher_mode_attribute() {
    let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
    assert_eq!(
        ctx.get_attribute(AttributeId::Mode).unwrap(),
        AttrValue::Mode(CryptMode::Cbc)
    );
    ctx.set_attribute(AttributeId::Mode, AttrValue::Mode(CryptMode::Ofb))
        .unwrap();
    ctx.load_key(&[0x11; 32]).unwrap();
    ctx.load_iv(&[0x22; 16]).unwrap();

    // OFB is a stream mode, so odd lengths are fine and decryption is
    // the same transform.
    let mut buf = *b"an odd-length message";
    ctx.encrypt(&mut buf).unwrap();

    let mut dec = ContextInfo::new(Algorithm::Aes).unwrap();
    dec.set_attribute(AttributeId::Mode, AttrValue::Mode(CryptMode::Ofb))
        .unwrap();
    dec.load_key(&[0x11; 32]).unwrap();
    dec.load_iv(&[0x22; 16]).unwrap();
    dec.decrypt(&mut buf).unwrap();
    assert_eq!(&buf, b"an odd-length message");
}

#[test]
fn test_sha2_known_answer() {
    let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
    ctx.hash_data(b"abc").unwrap();
    let expected = hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        .unwrap();
    assert!(ctx.compare_hash(&expected).unwrap());
}

#[test]
fn test_hash_value_attribute_finalises() {
    let mut ctx = ContextInfo::new(Algorithm::Sha2).unwrap();
    ctx.hash_data(b"ab").unwrap();
    ctx.hash_data(b"c").unwrap();
    let mut out = [0u8; 64];
    let len = ctx.get_attribute_bytes(AttributeId::HashValue, &mut out).unwrap();
    assert_eq!(
        hex::encode(&out[..len]),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    // Finalised: further data is refused until the value is deleted.
    assert!(ctx.hash_data(b"more").is_err());
}

#[test]
fn test_hmac_contexts_agree() {
    let key = [0x0b; 20];
    let mut a = ContextInfo::new(Algorithm::HmacSha2).unwrap();
    a.load_key(&key).unwrap();
    a.hash_data(b"Hi There").unwrap();
    let mut mac = [0u8; 64];
    let len = a.get_attribute_bytes(AttributeId::HashValue, &mut mac).unwrap();

    let mut b = ContextInfo::new(Algorithm::HmacSha2).unwrap();
    b.load_key(&key).unwrap();
    b.hash_data(b"Hi There").unwrap();
    assert!(b.compare_hash(&mac[..len]).unwrap());
}

#[test]
fn test_derived_keys_are_deterministic() {
    let salt = [0x7e; 8];
    let passphrase = b"correct horse battery staple";
    let iv = [0u8; 16];
    let plaintext = *b"sixteen byte blk";

    let derive_ctx = || {
        let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
        ctx.set_attribute_bytes(AttributeId::KeyingSalt, &salt).unwrap();
        ctx.derive_key(passphrase).unwrap();
        ctx.load_iv(&iv).unwrap();
        ctx
    };

    let mut buf_a = plaintext;
    derive_ctx().encrypt(&mut buf_a).unwrap();
    let mut buf_b = plaintext;
    derive_ctx().encrypt(&mut buf_b).unwrap();
    assert_eq!(buf_a, buf_b);
    assert_ne!(buf_a, plaintext);
}

#[test]
fn test_rsa_generate_and_round_trip() {
    let mut ctx = ContextInfo::new(Algorithm::Rsa).unwrap();
    ctx.set_attribute(AttributeId::KeySize, AttrValue::Size(128))
        .unwrap();
    ctx.generate_key().unwrap();
    let key_bytes = match ctx.get_attribute(AttributeId::KeySize).unwrap() {
        AttrValue::Size(n) => n,
        other => panic!("unexpected key size attribute {:?}", other),
    };
    assert_eq!(key_bytes, 128);

    let mut buf = vec![0u8; key_bytes];
    cryptoctx::rng::copy_randombytes(&mut buf);
    buf[0] = 0x01;
    let reference = buf.clone();
    ctx.encrypt(&mut buf).unwrap();
    assert_ne!(buf, reference);
    ctx.decrypt(&mut buf).unwrap();
    assert_eq!(buf, reference);
}

#[test]
fn test_dsa_generate_sign_verify() {
    let mut ctx = ContextInfo::new(Algorithm::Dsa).unwrap();
    ctx.generate_key().unwrap();

    let hash = [0x6d; 20];
    let mut sig = [0u8; 128];
    let mut params = DlpParams::new_sign(&hash, &mut sig);
    ctx.sign(&mut params).unwrap();
    let sig_len = params.out_len;
    assert_eq!(sig_len, 40);

    let mut out = [0u8; 0];
    let mut params = DlpParams::new_check(&hash, &sig[..sig_len], &mut out);
    ctx.sig_check(&mut params).unwrap();

    let mut other = hash;
    other[3] ^= 0x80;
    let mut params = DlpParams::new_check(&other, &sig[..sig_len], &mut out);
    assert!(ctx.sig_check(&mut params).is_err());
}

#[test]
fn test_ecdsa_generate_sign_verify() {
    let mut ctx = ContextInfo::new(Algorithm::Ecdsa).unwrap();
    ctx.generate_key().unwrap();

    let hash = [0x42; 32];
    let mut sig = [0u8; 64];
    let mut params = DlpParams::new_sign(&hash, &mut sig);
    ctx.sign(&mut params).unwrap();
    assert_eq!(params.out_len, 64);

    let mut out = [0u8; 0];
    let mut params = DlpParams::new_check(&hash, &sig, &mut out);
    ctx.sig_check(&mut params).unwrap();
}

#[test]
fn test_ecdh_agreement() {
    let mut a = ContextInfo::new(Algorithm::Ecdh).unwrap();
    a.generate_key().unwrap();
    let mut b = ContextInfo::new(Algorithm::Ecdh).unwrap();
    b.generate_key().unwrap();

    let mut qa = [0u8; 64];
    a.encrypt(&mut qa).unwrap();
    let mut qb = [0u8; 64];
    b.encrypt(&mut qb).unwrap();

    let mut sa = qb;
    a.decrypt(&mut sa).unwrap();
    let mut sb = qa;
    b.decrypt(&mut sb).unwrap();
    assert_eq!(sa, sb);
}

#[test]
fn test_unkeyed_context_refuses_data_and_latches_report() {
    let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
    let mut buf = [0u8; 16];
    let err = ctx.encrypt(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInited);
    assert_eq!(ctx.error_report().0, Some(AttributeId::Key));
}

#[test]
fn test_setup_attributes_are_one_shot() {
    let mut ctx = ContextInfo::new(Algorithm::Aes).unwrap();
    ctx.load_key(&[0x33; 16]).unwrap();
    let err = ctx.load_key(&[0x44; 16]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inited);
}

#[test]
fn test_insecure_key_size_reported_distinctly() {
    // A 512-bit modulus is well-formed but below the secure floor, and
    // must be distinguishable from malformed input.
    use cryptoctx::keyload::{DlpComponents, PkcComponents};

    let mut ctx = ContextInfo::new(Algorithm::Dsa).unwrap();
    let c = DlpComponents::domain(vec![0xff; 64], vec![0x02], vec![0x03; 20]);
    let err = ctx.load_key_components(&PkcComponents::Dlp(c)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Insecure);
}
