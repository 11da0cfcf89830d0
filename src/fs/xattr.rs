//! Extended attribute passthrough (symlinks are not followed)
//!
//! Values are copied through unencrypted, like every other piece of
//! metadata.

use std::ffi::OsStr;
#[cfg(target_os = "linux")]
use std::ffi::CString;
use std::io;
#[cfg(target_os = "linux")]
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

#[cfg(target_os = "linux")]
fn c_string(bytes: &[u8]) -> io::Result<CString> {
    CString::new(bytes).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

#[cfg(target_os = "linux")]
fn c_path(path: &Path) -> io::Result<CString> {
    c_string(path.as_os_str().as_bytes())
}

#[cfg(target_os = "linux")]
fn check(res: libc::ssize_t) -> io::Result<usize> {
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res as usize)
    }
}

/// Fetch an attribute. With `size == 0` only the value length is returned.
#[cfg(target_os = "linux")]
pub fn get(path: &Path, name: &OsStr, size: usize) -> io::Result<Vec<u8>> {
    let path = c_path(path)?;
    let name = c_string(name.as_bytes())?;
    let mut buf = vec![0u8; size];

    let len = check(unsafe {
        libc::lgetxattr(
            path.as_ptr(),
            name.as_ptr(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
        )
    })?;
    if size == 0 {
        return Ok(vec![0u8; len]);
    }
    buf.truncate(len);
    Ok(buf)
}

/// Set an attribute
#[cfg(target_os = "linux")]
pub fn set(path: &Path, name: &OsStr, value: &[u8], flags: i32) -> io::Result<()> {
    let path = c_path(path)?;
    let name = c_string(name.as_bytes())?;

    let res = unsafe {
        libc::lsetxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            flags,
        )
    };
    check(res as libc::ssize_t).map(|_| ())
}

/// NUL-separated attribute names. With `size == 0` only the length matters.
#[cfg(target_os = "linux")]
pub fn list(path: &Path, size: usize) -> io::Result<Vec<u8>> {
    let path = c_path(path)?;
    let mut buf = vec![0u8; size];

    let len = check(unsafe {
        libc::llistxattr(path.as_ptr(), buf.as_mut_ptr() as *mut libc::c_char, buf.len())
    })?;
    if size == 0 {
        return Ok(vec![0u8; len]);
    }
    buf.truncate(len);
    Ok(buf)
}

/// Remove an attribute
#[cfg(target_os = "linux")]
pub fn remove(path: &Path, name: &OsStr) -> io::Result<()> {
    let path = c_path(path)?;
    let name = c_string(name.as_bytes())?;

    let res = unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) };
    check(res as libc::ssize_t).map(|_| ())
}

#[cfg(not(target_os = "linux"))]
fn unsupported<T>() -> io::Result<T> {
    Err(io::Error::from_raw_os_error(libc::ENOTSUP))
}

#[cfg(not(target_os = "linux"))]
pub fn get(_path: &Path, _name: &OsStr, _size: usize) -> io::Result<Vec<u8>> {
    unsupported()
}

#[cfg(not(target_os = "linux"))]
pub fn set(_path: &Path, _name: &OsStr, _value: &[u8], _flags: i32) -> io::Result<()> {
    unsupported()
}

#[cfg(not(target_os = "linux"))]
pub fn list(_path: &Path, _size: usize) -> io::Result<Vec<u8>> {
    unsupported()
}

#[cfg(not(target_os = "linux"))]
pub fn remove(_path: &Path, _name: &OsStr) -> io::Result<()> {
    unsupported()
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_user_xattr_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"").unwrap();

        let name = OsStr::new("user.cryptmirror.test");
        if let Err(e) = set(&path, name, b"value", 0) {
            // tmpfs without user xattrs, or similar
            eprintln!("skipping: xattrs unsupported here: {}", e);
            return;
        }

        assert_eq!(get(&path, name, 0).unwrap().len(), 5);
        assert_eq!(get(&path, name, 64).unwrap(), b"value");

        let names = list(&path, 256).unwrap();
        assert!(names
            .split(|&b| b == 0)
            .any(|n| n == b"user.cryptmirror.test"));

        remove(&path, name).unwrap();
        assert!(get(&path, name, 64).is_err());
    }

    #[test]
    fn test_interior_nul_rejected() {
        let err = get(Path::new("/tmp"), OsStr::new("user.a\0b"), 0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }
}
