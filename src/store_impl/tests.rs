//! Tests for the tensor store

#[cfg(test)]
mod tests {
    use super::super::{AmplitudeStorage, FileTag, Mode, TensorStore, RECORD_T2};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn scratch_dir(label: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "cepa_store_test_{}_{}_{}",
            label,
            std::process::id(),
            n
        ))
    }

    #[test]
    fn whole_record_round_trip() {
        let store = TensorStore::new(scratch_dir("round_trip")).unwrap();
        let data: Vec<f64> = (0..64).map(|i| i as f64 * 0.5).collect();

        let file = store.open(FileTag::Residual, Mode::New).unwrap();
        file.write_entry("residual", &data).unwrap();
        file.close(true).unwrap();

        let mut out = vec![0.0; 64];
        let file = store.open(FileTag::Residual, Mode::Old).unwrap();
        file.read_entry("residual", &mut out).unwrap();
        file.close(true).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn chunked_streaming_matches_whole_record() {
        let store = TensorStore::new(scratch_dir("chunks")).unwrap();
        let data: Vec<f64> = (0..30).map(|i| (i as f64).sin()).collect();

        let file = store.open(FileTag::VvvvPlus, Mode::New).unwrap();
        let mut writer = file.writer("vvvv_plus").unwrap();
        for chunk in data.chunks(7) {
            writer.write_chunk(chunk).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = file.reader("vvvv_plus").unwrap();
        let mut out = vec![0.0; 30];
        for chunk in out.chunks_mut(7) {
            reader.read_chunk(chunk).unwrap();
        }
        assert_eq!(out, data);

        // reposition and re-read a middle chunk
        let mut reader = file.reader("vvvv_plus").unwrap();
        reader.seek_to(10).unwrap();
        let mut mid = vec![0.0; 5];
        reader.read_chunk(&mut mid).unwrap();
        assert_eq!(mid, data[10..15]);
        file.close(true).unwrap();
    }

    #[test]
    fn close_without_keep_deletes_storage() {
        let store = TensorStore::new(scratch_dir("delete")).unwrap();
        let file = store.open(FileTag::DiisOld, Mode::New).unwrap();
        file.write_entry("oldvector1", &[1.0, 2.0]).unwrap();
        assert!(store.exists(FileTag::DiisOld));
        file.close(false).unwrap();
        assert!(!store.exists(FileTag::DiisOld));
    }

    #[test]
    fn open_old_requires_existing_file() {
        let store = TensorStore::new(scratch_dir("missing")).unwrap();
        assert!(store.open(FileTag::Oooo, Mode::Old).is_err());
    }

    #[test]
    fn open_new_truncates_previous_records() {
        let store = TensorStore::new(scratch_dir("truncate")).unwrap();
        let file = store.open(FileTag::DiisErr, Mode::New).unwrap();
        file.write_entry("evector1", &[1.0]).unwrap();
        file.close(true).unwrap();

        let file = store.open(FileTag::DiisErr, Mode::New).unwrap();
        let mut out = [0.0];
        assert!(file.read_entry("evector1", &mut out).is_err());
        file.close(false).unwrap();
    }

    #[test]
    fn disk_resident_amplitudes_round_trip() {
        let store = TensorStore::new(scratch_dir("amplitudes")).unwrap();
        let file = store.open(FileTag::Doubles, Mode::New).unwrap();
        file.write_entry(RECORD_T2, &[0.0; 8]).unwrap();
        file.close(true).unwrap();

        let mut t2 = AmplitudeStorage::OnDisk;
        let data: Vec<f64> = (0..8).map(|i| -(i as f64)).collect();
        t2.write_from(&store, &data).unwrap();

        let mut scratch = vec![0.0; 8];
        assert_eq!(t2.load(&store, &mut scratch).unwrap(), &data[..]);

        let mut out = vec![0.0; 8];
        t2.read_into(&store, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn in_core_amplitudes_ignore_store() {
        let store = TensorStore::new(scratch_dir("in_core")).unwrap();
        let mut t2 = AmplitudeStorage::InCore(vec![0.0; 4]);
        t2.write_from(&store, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut scratch = vec![0.0; 4];
        assert_eq!(
            t2.load(&store, &mut scratch).unwrap(),
            &[1.0, 2.0, 3.0, 4.0]
        );
        assert!(!t2.on_disk());
    }

    #[test]
    fn file_tags_have_stable_identifiers() {
        assert_eq!(FileTag::Oooo.id(), 260);
        assert_eq!(FileTag::Residual.id(), 280);
        assert_eq!(FileTag::Residual.filename(), "r2");
        assert_eq!(FileTag::DiisErr.filename(), "diis_err");
    }
}
