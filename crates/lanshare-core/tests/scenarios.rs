//! 端到端场景测试 - 直接驱动协调器
//!
//! 覆盖设备注册、定向上传、一次性下载和存活窗口的完整流程。

use bytes::Bytes;
use chrono::Duration;
use lanshare_core::{Coordinator, Error, ManualClock, ServerSettings};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

fn lan(last: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
}

fn coordinator() -> (Arc<ManualClock>, Coordinator) {
    let clock = Arc::new(ManualClock::starting_now());
    let coordinator = Coordinator::with_clock(&ServerSettings::default(), clock.clone());
    (clock, coordinator)
}

/// 场景 1: 广播文件被任意设备看到，下载一次后消失
#[test]
fn test_broadcast_file_is_consumed_once() {
    let (_, c) = coordinator();
    let _a = c.registry().register("Linux PC", lan(10));
    let b = c.registry().register("Android", lan(11));

    let meta = c
        .store()
        .put("report.pdf", Bytes::from(vec![0x25u8; 500_000]), None)
        .unwrap();

    let listed = c.list_files(Some(b));
    assert!(listed.iter().any(|m| m.original_name == "report.pdf"));

    let (got, content) = c.claim_file(&meta.id, Some(b)).unwrap();
    assert_eq!(got.original_name, "report.pdf");
    assert_eq!(content.len(), 500_000);

    assert!(c.list_files(Some(b)).is_empty());
    assert_eq!(c.claim_file(&meta.id, Some(b)), Err(Error::NotFound));
}

/// 场景 2: 定向文件只对目标设备可见，其他设备下载被拒绝
#[test]
fn test_targeted_file_only_reaches_target() {
    let (_, c) = coordinator();
    let a = c.registry().register("Mac", lan(10));
    let b = c.registry().register("iPhone", lan(11));

    let meta = c
        .store()
        .put("secret.txt", Bytes::from_static(b"top secret"), Some(b))
        .unwrap();

    assert!(c.list_files(Some(a)).is_empty());
    assert_eq!(c.list_files(Some(b))[0].id, meta.id);

    assert_eq!(c.claim_file(&meta.id, Some(a)), Err(Error::NotFound));
    let (_, content) = c.claim_file(&meta.id, Some(b)).unwrap();
    assert_eq!(&content[..], b"top secret");
}

/// 场景 3: 超过存活窗口后设备从列表消失，心跳返回 NotFound
#[test]
fn test_device_expires_without_heartbeat() {
    let (clock, c) = coordinator();
    let a = c.registry().register("Windows PC", lan(10));

    clock.advance(Duration::seconds(151));

    assert!(c.registry().list_active().is_empty());
    assert_eq!(c.registry().heartbeat(&a), Err(Error::NotFound));

    // 重新注册得到新的 ID
    let again = c.registry().register("Windows PC", lan(10));
    assert_ne!(again, a);
    assert_eq!(c.registry().list_active().len(), 1);
}

/// 目标设备过期不影响文件本身，文件仍然只属于原目标
#[test]
fn test_target_expiry_leaves_file_unreachable() {
    let (clock, c) = coordinator();
    let a = c.registry().register("a", lan(10));
    let b = c.registry().register("b", lan(11));
    let meta = c
        .store()
        .put("for-b.zip", Bytes::from_static(b"zip"), Some(b))
        .unwrap();

    clock.advance(Duration::seconds(200));
    c.registry().heartbeat(&a).unwrap_err();

    assert_eq!(c.stats().files, 1);
    assert!(c.list_files(Some(a)).is_empty());

    // 过期的目标设备用自己的旧 ID 也无法领取
    assert!(c.registry().get(&b).is_none());
    assert!(c.list_files(Some(b)).is_empty());
    assert_eq!(c.claim_file(&meta.id, Some(b)), Err(Error::NotFound));
    assert_eq!(c.stats().files, 1);

    // 重新注册得到新 ID，旧文件仍不属于它
    let b2 = c.registry().register("b", lan(11));
    assert!(c.list_files(Some(b2)).is_empty());
}
