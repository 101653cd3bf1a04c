use std::io::SeekFrom;
use std::time::Duration;

use scull::io::{CopyFault, UserSink};
use scull::{
    AccessMode, Capabilities, CommandArg, CommandId, DeviceId, DeviceRegistry, File, Geometry,
    OpenOptions, ScullConfig, ScullError,
};
use tokio_util::sync::CancellationToken;

// Store with block size 4 and node-array length 2 (node span 8)
fn small_registry() -> DeviceRegistry {
    let config = ScullConfig {
        nr_devs: 1,
        quantum: 4,
        qset: 2,
        ..ScullConfig::default()
    };
    DeviceRegistry::new(&config).unwrap()
}

async fn open(registry: &DeviceRegistry, access: AccessMode) -> File {
    registry
        .open(DeviceId::Scull(0), OpenOptions::new().access(access))
        .await
        .unwrap()
}

async fn open_admin(registry: &DeviceRegistry) -> File {
    registry
        .open(
            DeviceId::Scull(0),
            OpenOptions::new().capabilities(Capabilities::admin()),
        )
        .await
        .unwrap()
}

struct FaultySink;

impl UserSink for FaultySink {
    fn len(&self) -> usize {
        16
    }

    fn copy_from(&mut self, _src: &[u8]) -> Result<(), CopyFault> {
        Err(CopyFault)
    }
}

#[tokio::test]
async fn test_write_then_clamped_reads() {
    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;

    // Writes stop at each block boundary
    let data = b"0123456789";
    let mut written = 0;
    while written < data.len() {
        written += file.write(&data[written..]).await.unwrap();
    }
    assert_eq!(file.position(), 10);
    let device = registry.scull(0).unwrap();
    assert_eq!(device.size(&CancellationToken::new()).await.unwrap(), 10);

    file.seek(SeekFrom::Start(6)).await.unwrap();
    let mut buf = [0u8; 10];
    assert_eq!(file.read(&mut buf).await.unwrap(), 2);
    assert_eq!(&buf[..2], b"67");
    assert_eq!(file.position(), 8);
    assert_eq!(file.read(&mut buf).await.unwrap(), 2);
    assert_eq!(&buf[..2], b"89");

    // At and beyond size: EOF, not an error
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);
    file.seek(SeekFrom::Start(100)).await.unwrap();
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_earlier_bytes_survive_growth() {
    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;

    file.write(b"abc").await.unwrap();
    file.seek(SeekFrom::Start(28)).await.unwrap();
    assert_eq!(file.write(b"wxyz").await.unwrap(), 4);

    file.seek(SeekFrom::Start(0)).await.unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(file.read(&mut buf).await.unwrap(), 3);
    assert_eq!(&buf, b"abc");

    // Inside the size but never written: a hole reads as EOF
    file.seek(SeekFrom::Start(12)).await.unwrap();
    assert_eq!(file.read(&mut buf).await.unwrap(), 0);

    file.seek(SeekFrom::End(-3)).await.unwrap();
    assert_eq!(file.read(&mut buf).await.unwrap(), 3);
    assert_eq!(&buf, b"xyz");
}

#[tokio::test]
async fn test_write_only_open_trims() {
    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;
    file.write(b"0123").await.unwrap();
    file.close().await.unwrap();

    // Read-only open keeps the contents
    let mut reader = open(&registry, AccessMode::ReadOnly).await;
    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf).await.unwrap(), 4);

    let _writer = open(&registry, AccessMode::WriteOnly).await;
    reader.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    let device = registry.scull(0).unwrap();
    assert_eq!(device.size(&CancellationToken::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_access_mode_enforced() {
    let registry = small_registry();
    let mut reader = open(&registry, AccessMode::ReadOnly).await;
    assert_eq!(reader.write(b"x").await, Err(ScullError::BadDescriptor));

    let mut writer = open(&registry, AccessMode::WriteOnly).await;
    let mut buf = [0u8; 1];
    assert_eq!(writer.read(&mut buf).await, Err(ScullError::BadDescriptor));
}

#[tokio::test]
async fn test_seek_variants() {
    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;
    file.write(b"0123").await.unwrap();
    file.write(b"45").await.unwrap();

    assert_eq!(file.seek(SeekFrom::Current(-2)).await, Ok(4));
    assert_eq!(file.seek(SeekFrom::End(0)).await, Ok(6));
    assert_eq!(file.seek(SeekFrom::Start(1)).await, Ok(1));
    assert_eq!(
        file.seek(SeekFrom::Current(-2)).await,
        Err(ScullError::InvalidArgument)
    );
    assert_eq!(
        file.seek(SeekFrom::End(-7)).await,
        Err(ScullError::InvalidArgument)
    );
    // A failed seek leaves the position alone
    assert_eq!(file.position(), 1);
}

#[tokio::test]
async fn test_read_fault_reported() {
    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;
    file.write(b"0123").await.unwrap();
    file.seek(SeekFrom::Start(0)).await.unwrap();

    let mut sink = FaultySink;
    assert_eq!(file.read_user(&mut sink).await, Err(ScullError::Fault));
    assert_eq!(file.position(), 0);
}

#[tokio::test]
async fn test_cancelled_token_interrupts() {
    let registry = small_registry();
    let cancel = CancellationToken::new();
    let mut file = registry
        .open(
            DeviceId::Scull(0),
            OpenOptions::new().cancel_token(cancel.clone()),
        )
        .await
        .unwrap();

    cancel.cancel();
    assert_eq!(file.write(b"abc").await, Err(ScullError::Interrupted));
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).await, Err(ScullError::Interrupted));
    assert!(ScullError::Interrupted.is_retryable());
}

#[tokio::test]
async fn test_ioctl_query_and_privileged_tell() {
    let registry = small_registry();
    let mut user = open(&registry, AccessMode::ReadWrite).await;

    let quantum = user
        .ioctl(CommandId::QueryQuantum.raw(), CommandArg::None)
        .await
        .unwrap();
    assert_eq!(quantum, 4);

    let err = user
        .ioctl(CommandId::TellQuantum.raw(), CommandArg::Value(16))
        .await
        .unwrap_err();
    assert_eq!(err, ScullError::PermissionDenied);
    assert_eq!(err.errno(), 1);

    let mut admin = open_admin(&registry).await;
    admin
        .ioctl(CommandId::TellQuantum.raw(), CommandArg::Value(16))
        .await
        .unwrap();

    let mut slot = 0usize;
    user.ioctl(CommandId::GetQuantum.raw(), CommandArg::Ref(&mut slot))
        .await
        .unwrap();
    assert_eq!(slot, 16);
}

#[tokio::test]
async fn test_ioctl_exchange_and_shift() {
    let registry = small_registry();
    let mut admin = open_admin(&registry).await;

    let mut slot = 9usize;
    admin
        .ioctl(CommandId::ExchangeQset.raw(), CommandArg::Ref(&mut slot))
        .await
        .unwrap();
    assert_eq!(slot, 2);

    let old = admin
        .ioctl(CommandId::ShiftQset.raw(), CommandArg::Value(5))
        .await
        .unwrap();
    assert_eq!(old, 9);

    admin
        .ioctl(CommandId::Reset.raw(), CommandArg::None)
        .await
        .unwrap();
    let qset = admin
        .ioctl(CommandId::QueryQset.raw(), CommandArg::None)
        .await
        .unwrap();
    assert_eq!(qset, Geometry::default().qset());
}

#[tokio::test]
async fn test_ioctl_rejects_bad_commands() {
    let registry = small_registry();
    let mut admin = open_admin(&registry).await;

    let unknown = (u32::from(b'k') << 8) | 13;
    assert_eq!(
        admin.ioctl(unknown, CommandArg::None).await,
        Err(ScullError::InvalidArgument)
    );
    assert_eq!(
        admin
            .ioctl(CommandId::TellQset.raw(), CommandArg::Value(0))
            .await,
        Err(ScullError::InvalidArgument)
    );
}

#[tokio::test]
async fn test_geometry_change_waits_for_trim() {
    let registry = small_registry();
    let device = registry.scull(0).unwrap();
    let token = CancellationToken::new();

    let mut admin = open_admin(&registry).await;
    admin.write(b"0123").await.unwrap();
    admin
        .ioctl(CommandId::TellQuantum.raw(), CommandArg::Value(8))
        .await
        .unwrap();

    let (active, configured) = device.geometry(&token).await.unwrap();
    assert_eq!(active.quantum(), 4);
    assert_eq!(configured.quantum(), 8);

    // Stored data is still addressed with the old geometry
    admin.seek(SeekFrom::Start(0)).await.unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(admin.read(&mut buf).await.unwrap(), 4);

    device.trim(&token).await.unwrap();
    let (active, _) = device.geometry(&token).await.unwrap();
    assert_eq!(active.quantum(), 8);

    admin.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(admin.write(b"0123456789").await.unwrap(), 8);
}

#[tokio::test]
async fn test_embedded_io_traits() {
    use embedded_io_async::{Read, Write};

    async fn copy_all(w: &mut impl Write<Error = ScullError>, data: &[u8]) {
        let mut rest = data;
        while !rest.is_empty() {
            let n = w.write(rest).await.unwrap();
            rest = &rest[n..];
        }
        w.flush().await.unwrap();
    }

    async fn drain(r: &mut impl Read<Error = ScullError>) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = r.read(&mut buf).await.unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    let registry = small_registry();
    let mut file = open(&registry, AccessMode::ReadWrite).await;
    copy_all(&mut file, b"hello, scull").await;
    file.seek(SeekFrom::Start(0)).await.unwrap();
    assert_eq!(drain(&mut file).await, b"hello, scull");
}

#[tokio::test]
async fn test_failed_block_allocation_releases_lock() {
    let config = ScullConfig {
        nr_devs: 1,
        quantum: usize::MAX / 2,
        qset: 1,
        ..ScullConfig::default()
    };
    let registry = DeviceRegistry::new(&config).unwrap();
    let token = CancellationToken::new();
    let device = registry.scull(0).unwrap();

    let mut file = open(&registry, AccessMode::ReadWrite).await;
    assert_eq!(file.write(b"abc").await, Err(ScullError::OutOfMemory));
    assert_eq!(file.position(), 0);

    let size = tokio::time::timeout(Duration::from_secs(2), device.size(&token))
        .await
        .unwrap();
    assert_eq!(size, Ok(0));
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).await, Ok(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ioctl_runs_on_spawned_task() {
    let registry = small_registry();
    let mut admin = open_admin(&registry).await;

    let task = tokio::spawn(async move {
        let mut slot = 32usize;
        let result = admin
            .ioctl(CommandId::ExchangeQuantum.raw(), CommandArg::Ref(&mut slot))
            .await;
        result.map(|_| slot)
    });
    assert_eq!(task.await.unwrap(), Ok(4));

    let (_, configured) = registry
        .scull(0)
        .unwrap()
        .geometry(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(configured.quantum(), 32);
}

