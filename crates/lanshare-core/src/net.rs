//! 本机网络地址探测

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// 获取用于局域网通信的本机 IP
///
/// 通过向外部地址 "连接" UDP 套接字（不会实际发送数据）确定出口网卡，
/// 失败时回退到回环地址。
pub fn local_ip() -> IpAddr {
    probe_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn probe_local_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}
