// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `AF_PACKET` raw socket bound to one interface.
//!
//! Receives only the AVTP ethertype, joins the MAAP multicast MAC, and
//! exposes blocking send/recv. Send and recv may run on different
//! threads over the same descriptor.

use maap::config::{MAAP_DEST_MAC, MAAP_ETHERTYPE};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// Raw layer-2 socket plus the interface identity it is bound to.
pub struct RawSock {
    fd: RawFd,
    ifindex: i32,
    mac: u64,
}

impl RawSock {
    /// Open, bind and configure the socket for `ifname`.
    pub fn open(ifname: &str) -> io::Result<RawSock> {
        if ifname.len() >= libc::IFNAMSIZ {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "interface name too long",
            ));
        }

        // SAFETY: plain socket(2) call, result checked below.
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW,
                i32::from(u16::to_be(MAAP_ETHERTYPE)),
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        match Self::configure(fd, ifname) {
            Ok((ifindex, mac)) => {
                log::debug!(
                    "[netio] bound {} (ifindex {}, mac {:#014x})",
                    ifname,
                    ifindex,
                    mac
                );
                Ok(RawSock { fd, ifindex, mac })
            }
            Err(err) => {
                // SAFETY: fd came from socket(2) above and is not stored.
                unsafe {
                    libc::close(fd);
                }
                Err(err)
            }
        }
    }

    fn configure(fd: RawFd, ifname: &str) -> io::Result<(i32, u64)> {
        // SAFETY: zeroed ifreq with a NUL-terminated name shorter than IFNAMSIZ.
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        for (dst, src) in ifr.ifr_name.iter_mut().zip(ifname.as_bytes()) {
            *dst = *src as libc::c_char;
        }

        // Interface index.
        // SAFETY: ioctl with a valid fd and a properly initialized ifreq.
        if unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX as libc::c_ulong, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: SIOCGIFINDEX filled the ifru_ifindex union member.
        let ifindex = unsafe { ifr.ifr_ifru.ifru_ifindex };

        // Hardware address.
        // SAFETY: ioctl with a valid fd and a properly initialized ifreq.
        if unsafe { libc::ioctl(fd, libc::SIOCGIFHWADDR as libc::c_ulong, &mut ifr) } < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: SIOCGIFHWADDR filled the ifru_hwaddr union member.
        let hw = unsafe { ifr.ifr_ifru.ifru_hwaddr };
        let mac = hw.sa_data[..6]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b as u8));

        // Bind to the interface for the AVTP ethertype.
        // SAFETY: sockaddr_ll is fully initialized before the bind call.
        let bound = unsafe {
            let mut sll: libc::sockaddr_ll = std::mem::zeroed();
            sll.sll_family = libc::AF_PACKET as libc::c_ushort;
            sll.sll_protocol = u16::to_be(MAAP_ETHERTYPE);
            sll.sll_ifindex = ifindex;
            libc::bind(
                fd,
                std::ptr::addr_of!(sll).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if bound < 0 {
            return Err(io::Error::last_os_error());
        }

        // Join the MAAP multicast MAC so announcements reach us.
        // SAFETY: packet_mreq is fully initialized before the setsockopt call.
        let joined = unsafe {
            let mut mreq: libc::packet_mreq = std::mem::zeroed();
            mreq.mr_ifindex = ifindex;
            mreq.mr_type = libc::PACKET_MR_MULTICAST as libc::c_ushort;
            mreq.mr_alen = 6;
            for (dst, src) in mreq
                .mr_address
                .iter_mut()
                .zip(&MAAP_DEST_MAC.to_be_bytes()[2..8])
            {
                *dst = *src;
            }
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                libc::PACKET_ADD_MEMBERSHIP,
                std::ptr::addr_of!(mreq).cast::<libc::c_void>(),
                std::mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
            )
        };
        if joined < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok((ifindex, mac))
    }

    /// MAC address of the bound interface, zero-extended.
    pub fn mac(&self) -> u64 {
        self.mac
    }

    /// Block until one frame arrives; returns its length.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buffer pointer and length describe a valid writable slice.
        let n = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    /// Transmit one frame on the bound interface.
    pub fn send(&self, frame: &[u8]) -> io::Result<()> {
        if frame.len() < 14 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "frame shorter than an Ethernet header",
            ));
        }
        // SAFETY: sockaddr_ll is fully initialized; frame slice is valid.
        let n = unsafe {
            let mut sll: libc::sockaddr_ll = std::mem::zeroed();
            sll.sll_family = libc::AF_PACKET as libc::c_ushort;
            sll.sll_protocol = u16::to_be(MAAP_ETHERTYPE);
            sll.sll_ifindex = self.ifindex;
            sll.sll_halen = 6;
            sll.sll_addr[..6].copy_from_slice(&frame[..6]);
            libc::sendto(
                self.fd,
                frame.as_ptr().cast::<libc::c_void>(),
                frame.len(),
                0,
                std::ptr::addr_of!(sll).cast::<libc::sockaddr>(),
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for RawSock {
    fn drop(&mut self) {
        // SAFETY: fd was returned by socket(2) and is closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// [`maap::Transport`] over a shared [`RawSock`].
pub struct RawTransport(pub Arc<RawSock>);

impl maap::Transport for RawTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.send(frame)
    }
}
