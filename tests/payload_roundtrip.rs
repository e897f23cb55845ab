use proptest::prelude::*;

use viera::crypto::{decrypt_payload, encrypt_payload, MacPolicy, SessionKeys};

proptest! {
    #[test]
    fn decrypt_recovers_plaintext(iv in any::<[u8; 16]>(), text in "\\PC{0,200}") {
        let keys = SessionKeys::from_iv(iv);
        let sealed = encrypt_payload(&text, &keys).unwrap();
        prop_assert_eq!(decrypt_payload(&sealed, &keys, MacPolicy::Verify).unwrap(), text);
    }

    #[test]
    fn derivation_is_a_pure_function(iv in any::<[u8; 16]>()) {
        let a = SessionKeys::from_iv(iv);
        let b = SessionKeys::from_iv(iv);
        prop_assert_eq!(a.key(), b.key());
        prop_assert_eq!(&a.hmac_key()[..16], &iv[..]);
        prop_assert_eq!(&a.hmac_key()[16..], &iv[..]);
    }
}
