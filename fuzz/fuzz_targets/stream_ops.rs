#![no_main]

use futures_executor::block_on;
use libfuzzer_sys::fuzz_target;
use memvault::{PoolConfig, PoolManager, Uuid};

// Drive arbitrary write/read/seek sequences against a pooled stream and
// check it against a plain Vec<u8> model.
fuzz_target!(|data: Vec<u8>| {
    let config = PoolConfig::new(16, 64, 256)
        .unwrap()
        .with_max_stream_size(4096);
    let pool = PoolManager::new(config).unwrap();

    block_on(async {
        let seed = data.first().copied().unwrap_or(0);
        let initial = vec![seed; (seed as usize) % 32];

        let stream = pool.acquire(Uuid::new_v4(), &initial).await.unwrap();
        let mut model = initial.clone();
        let mut pos = 0usize;

        let mut ops = data.iter().copied();
        while let Some(op) = ops.next() {
            let arg = ops.next().unwrap_or(1) as usize;
            match op % 4 {
                // Write `arg` bytes at the cursor
                0 => {
                    let chunk = vec![op; arg % 128];
                    if stream.write(&chunk).await.is_ok() {
                        let end = pos + chunk.len();
                        if end > model.len() {
                            model.resize(end, 0);
                        }
                        model[pos..end].copy_from_slice(&chunk);
                        pos = end;
                    }
                }
                // Read `arg` bytes from the cursor
                1 => {
                    let mut buf = vec![0u8; arg % 128];
                    let n = stream.read(&mut buf).await.unwrap();
                    assert_eq!(&buf[..n], &model[pos..pos + n]);
                    pos += n;
                }
                // Seek
                2 => {
                    let target = arg % (model.len() + 1);
                    stream.set_position(target).unwrap();
                    pos = target;
                }
                // Check length/position invariants
                _ => {
                    assert_eq!(stream.len().unwrap(), model.len());
                    assert_eq!(stream.position().unwrap(), pos);
                }
            }
        }

        // Full content must match the model
        stream.set_position(0).unwrap();
        let mut content = vec![0u8; model.len()];
        let mut filled = 0;
        while filled < content.len() {
            let n = stream.read(&mut content[filled..]).await.unwrap();
            assert!(n > 0);
            filled += n;
        }
        assert_eq!(content, model);

        // Release exactly once; afterwards everything fails
        stream.release().await.unwrap();
        assert!(stream.release().await.is_err());
        assert!(stream.len().is_err());
    });
});
