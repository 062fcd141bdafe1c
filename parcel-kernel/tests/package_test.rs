//! Package pack/unpack tests
//!
//! Exercises packing, reconstruction from unordered reference batches, the
//! resource ceiling, legacy single-contract input and malformed envelopes.

#[cfg(test)]
mod tests {
    use parcel_kernel::meter::decode_cost;
    use parcel_kernel::proto::{
        ContractSignature, KeyEntry, PackageEnvelope, SealedContract, PACKAGE_TYPE_TAG, PACKAGE_VERSION,
    };
    use parcel_kernel::{
        Contract, ContractBuilder, ContractError, PackConfig, PackError, Package, SubItem,
    };
    use parcel_model::{PubKey, Role, RoleAlias, SignerKey, SimpleRole};
    use prost::Message;
    use std::collections::BTreeSet;
    use std::io;
    use std::sync::{Arc, Mutex};

    fn key(seed: u8) -> SignerKey {
        SignerKey::from_bytes(&[seed; 32])
    }

    fn leaf(name: &str) -> Arc<Contract> {
        ContractBuilder::new(name).seal().unwrap()
    }

    fn envelope(primary: &Contract, references: &[&Arc<Contract>]) -> PackageEnvelope {
        PackageEnvelope {
            type_tag: PACKAGE_TYPE_TAG.to_string(),
            version: PACKAGE_VERSION,
            contract: primary.sealed().to_vec(),
            references: references.iter().map(|c| c.sealed().to_vec()).collect(),
            keys: Vec::new(),
        }
    }

    /// Log output captured from a scoped fmt subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
        (out, text)
    }

    /// B is created by A; C revokes B and is also created by A.
    fn abc() -> (Arc<Contract>, Arc<Contract>, Arc<Contract>) {
        let b = leaf("b");
        let c = ContractBuilder::new("c").revoke(b.clone()).seal().unwrap();
        let a = ContractBuilder::new("a").add_new(b.clone()).add_new(c.clone()).seal().unwrap();
        (a, b, c)
    }

    #[test]
    fn test_round_trip_preserves_contents() {
        let owner = key(1);
        let (a, b, c) = abc();
        let a = ContractBuilder::new("a2")
            .role(Role::simple("owner", [owner.public_key()]))
            .add_new(a.clone())
            .signer(owner.clone())
            .seal()
            .unwrap();

        let package = Package::from_contract(a.clone()).unwrap();
        let packed = package.pack().unwrap();
        assert_eq!(package.pack().unwrap(), packed);

        let unpacked = Package::unpack(&packed, false).unwrap();
        assert!(!unpacked.is_reconstructed());
        assert_eq!(unpacked.contract().unwrap().id(), a.id());
        assert_eq!(unpacked.reference_ids(), package.reference_ids());
        assert_eq!(unpacked.keys(), BTreeSet::from([owner.public_key()]));
        assert!(unpacked.residual_ids().is_empty());

        // the reconstructed primary links every sub-contract
        let primary = unpacked.contract().unwrap();
        assert!(primary.signers().contains(&owner.public_key()));
        assert!(primary.is_role_allowed("owner", &unpacked.keys()));
        let inner = primary.new_items()[0].contract().unwrap();
        assert_eq!(inner.dependency_ids(), BTreeSet::from([b.id(), c.id()]));
        assert!(inner.new_items().iter().all(SubItem::is_resolved));

        // repacking the unpacked package is byte-identical
        assert_eq!(unpacked.pack().unwrap(), packed);
    }

    #[test]
    fn test_references_are_transitive() {
        let y = leaf("y");
        let x = ContractBuilder::new("x").revoke(y.clone()).seal().unwrap();
        let a = ContractBuilder::new("a").revoke(x.clone()).seal().unwrap();

        let package = Package::from_contract(a).unwrap();
        assert_eq!(package.reference_ids(), BTreeSet::from([x.id(), y.id()]));
        assert_eq!(package.reference(&y.id()).unwrap().name(), "y");

        let unpacked = Package::unpack(&package.pack().unwrap(), false).unwrap();
        let x = unpacked.reference(&x.id()).unwrap();
        assert!(x.revoking()[0].is_resolved());
    }

    #[test]
    fn test_reference_order_does_not_matter() {
        let (a, b, c) = abc();
        for order in [vec![&b, &c], vec![&c, &b]] {
            let bytes = envelope(&a, &order).encode_to_vec();
            let package = Package::unpack(&bytes, false).unwrap();

            let c_loaded = package.reference(&c.id()).unwrap();
            assert_eq!(c_loaded.revoking()[0].id(), b.id());
            assert!(c_loaded.revoking()[0].is_resolved());

            let primary = package.contract().unwrap();
            assert!(primary.new_items().iter().all(SubItem::is_resolved));
            assert!(package.residual_ids().is_empty());
        }
    }

    #[test]
    fn test_duplicate_reference_blobs_collapse() {
        let (a, b, c) = abc();
        let bytes = envelope(&a, &[&b, &c, &b]).encode_to_vec();
        let package = Package::unpack(&bytes, false).unwrap();
        assert_eq!(package.references().len(), 2);
    }

    #[test]
    fn test_dependency_outside_batch_stays_missing() {
        let (a, b, c) = abc();
        let bytes = envelope(&a, &[&c]).encode_to_vec();
        let package = Package::unpack(&bytes, false).unwrap();

        let c_loaded = package.reference(&c.id()).unwrap();
        assert!(matches!(c_loaded.revoking()[0], SubItem::Missing(id) if id == b.id()));
        let primary = package.contract().unwrap();
        assert!(primary.new_items().iter().any(|item| !item.is_resolved()));
        assert!(package.residual_ids().is_empty());
    }

    #[test]
    fn test_resource_limit() {
        let b = leaf("b");
        let a = ContractBuilder::new("a").add_new(b.clone()).seal().unwrap();
        let packed = Package::from_contract(a.clone()).unwrap().pack().unwrap();
        // reference blobs also pay for their descriptor pass
        let total = decode_cost(b.sealed().len()) + b.cost() + a.cost();

        let tight = PackConfig::default().with_cost_limit(total - 1);
        let err = Package::unpack_with_config(&packed, false, &tight).unwrap_err();
        assert!(matches!(err, PackError::ResourceLimitExceeded { .. }));

        let exact = PackConfig::default().with_cost_limit(total);
        assert!(Package::unpack_with_config(&packed, false, &exact).is_ok());
    }

    #[test]
    fn test_budget_exhausted_before_signature_checks() {
        let signer = key(3);
        let b = ContractBuilder::new("b").signer(signer.clone()).seal().unwrap();
        let mut sealed = SealedContract::decode(b.sealed()).unwrap();
        for _ in 0..50 {
            sealed.signatures.push(ContractSignature {
                signer: signer.public_key().to_vec(),
                signature: vec![0u8; 64],
            });
        }
        let forged = sealed.encode_to_vec();

        let a = leaf("a");
        let mut env = envelope(&a, &[]);
        env.references.push(forged.clone());
        let bytes = env.encode_to_vec();

        // enough for the descriptor pass and the decode, not for the checks
        let tight = PackConfig::default().with_cost_limit(2 * decode_cost(forged.len()));
        let (result, logs) = with_logs(|| Package::unpack_with_config(&bytes, false, &tight));
        assert!(matches!(result, Err(PackError::ResourceLimitExceeded { .. })));
        assert!(!logs.contains("Dropping signature"), "{}", logs);

        let (result, logs) = with_logs(|| Package::unpack(&bytes, false));
        let package = result.unwrap();
        assert!(logs.contains("Dropping signature"));
        let loaded = package.references().into_values().next().unwrap();
        assert_eq!(loaded.signers(), &BTreeSet::from([signer.public_key()]));
    }

    #[test]
    fn test_self_alias_reference_loads_and_denies() {
        let owner = key(4);
        let b = ContractBuilder::new("b")
            .role(Role::simple("owner", [owner.public_key()]))
            .role(Role::Alias(RoleAlias::from_parts("loop", "loop")))
            .role(Role::Alias(RoleAlias::from_parts("ping", "pong")))
            .role(Role::Alias(RoleAlias::from_parts("pong", "ping")))
            .seal()
            .unwrap();
        let a = ContractBuilder::new("a").add_new(b.clone()).seal().unwrap();

        let packed = Package::from_contract(a).unwrap().pack().unwrap();
        let package = Package::unpack(&packed, false).unwrap();
        let loaded = package.reference(&b.id()).unwrap();

        let keys = BTreeSet::from([owner.public_key()]);
        assert!(loaded.is_role_allowed("owner", &keys));
        for name in ["loop", "ping", "pong"] {
            assert!(!loaded.is_role_allowed(name, &keys));
        }
    }

    #[test]
    fn test_legacy_contract() {
        let contract = ContractBuilder::new("legacy").payload(b"x".to_vec()).seal().unwrap();

        let err = Package::unpack(contract.sealed(), false).unwrap_err();
        assert!(matches!(err, PackError::UnrecognizedFormat(_)));

        let package = Package::unpack(contract.sealed(), true).unwrap();
        assert!(package.is_reconstructed());
        assert_eq!(package.contract().unwrap().id(), contract.id());
        assert!(package.references().is_empty());
        assert_eq!(package.pack().unwrap(), contract.sealed());
    }

    #[test]
    fn test_legacy_embedded_contract() {
        let old = ContractBuilder::new("old").version(2).seal().unwrap();
        let next = ContractBuilder::new("next").version(2).revoke(old.clone()).seal().unwrap();

        let package = Package::unpack(next.sealed(), true).unwrap();
        let primary = package.contract().unwrap();
        assert_eq!(primary.revoking()[0].contract().unwrap().id(), old.id());
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let err = Package::unpack(&[0xFF, 0xFF, 0xFF], true).unwrap_err();
        assert!(matches!(err, PackError::UnrecognizedFormat(_)));

        for empty in [&[][..], &[0x08, 0x03][..]] {
            let err = Package::unpack(empty, true).unwrap_err();
            assert!(matches!(err, PackError::UnrecognizedFormat(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_missing_contract_field() {
        let b = leaf("b");
        let mut env = envelope(&b, &[]);
        env.contract.clear();
        let err = Package::unpack(&env.encode_to_vec(), true).unwrap_err();
        assert!(matches!(err, PackError::MissingRequiredField("contract")));
    }

    #[test]
    fn test_corrupt_reference_fails() {
        let a = leaf("a");
        let mut env = envelope(&a, &[]);
        env.references.push(vec![0xFF, 0xFF]);
        let err = Package::unpack(&env.encode_to_vec(), false).unwrap_err();
        assert!(matches!(err, PackError::Contract(ContractError::Decode(_))));
    }

    #[test]
    fn test_key_encodings() {
        let signer = key(7);
        let a = leaf("a");

        let mut env = envelope(&a, &[]);
        env.keys.push(KeyEntry::wrapped(&signer.public_key()));
        let package = Package::unpack(&env.encode_to_vec(), false).unwrap();
        assert_eq!(package.keys(), BTreeSet::from([signer.public_key()]));

        env.keys.push(KeyEntry { encoding: None });
        let err = Package::unpack(&env.encode_to_vec(), false).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedKeyEncoding(_)));
    }

    #[test]
    fn test_anonymous_role_matched_by_package_key() {
        let holder = key(8);
        let role = SimpleRole::with_anonymous_ids("owner", Vec::<PubKey>::new(), [holder.anonymous_id()]);
        let contract = ContractBuilder::new("anon").role(Role::Simple(role)).seal().unwrap();

        let package = Package::from_contract(contract).unwrap();
        package.add_keys([holder.public_key()]);
        let unpacked = Package::unpack(&package.pack().unwrap(), false).unwrap();

        assert_eq!(unpacked.key_for_anonymous_id(&holder.anonymous_id()), Some(holder.public_key()));
        let primary = unpacked.contract().unwrap();
        assert!(primary.is_role_allowed("owner", &unpacked.keys()));
        assert!(!primary.is_role_allowed("owner", &BTreeSet::from([key(9).public_key()])));
    }

    #[test]
    fn test_concurrent_reads() {
        let (a, _, _) = abc();
        let package = Arc::new(Package::from_contract(a).unwrap());
        let expected = package.pack().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let package = package.clone();
                std::thread::spawn(move || package.pack().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }
}
