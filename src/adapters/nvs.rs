//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] over the `meo` namespace.
//!
//! - **`target_os = "espidf"`** — raw `nvs_*` calls; every write is
//!   followed by `nvs_commit()`, which is atomic.
//! - **`not(target_os = "espidf")`** — in-memory map for host tests and
//!   simulation.

use crate::app::ports::{StorageError, StoragePort};
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::warn;

/// Namespace holding the provisioning record.
pub const NAMESPACE: &str = "meo";

pub struct NvsAdapter {
    initialised: bool,
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create the adapter.  Flash is brought up by [`StoragePort::init`].
    pub fn new() -> Self {
        Self {
            initialised: false,
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        }
    }

    /// Keys are NUL-terminated and truncated to the 15-byte NVS limit.
    #[cfg(target_os = "espidf")]
    fn c_key(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }

    /// Open the namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_key(NAMESPACE);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for NvsAdapter {
    fn init(&mut self) -> Result<(), StorageError> {
        if self.initialised {
            return Ok(());
        }

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                warn!("NVS: flash init failed ({})", ret);
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised (namespace '{}')", NAMESPACE);
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        self.initialised = true;
        Ok(())
    }

    fn read(&self, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(key) {
                // Same as NVS: a value larger than the buffer is an error.
                Some(data) if data.len() > buf.len() => Err(StorageError::InvalidData),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key_buf = Self::c_key(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::InvalidData),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().insert(key.to_owned(), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let key_buf = Self::c_key(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_buf.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|e| {
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().remove(key);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let key_buf = Self::c_key(key);
                let ret = unsafe { nvs_erase_key(handle, key_buf.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow().contains_key(key)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(false, |handle| {
                let key_buf = Self::c_key(key);
                let ret = unsafe {
                    nvs_find_key(handle, key_buf.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }

    fn clear_all(&mut self) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().clear();
            info!("NvsAdapter: namespace cleared (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(true, |handle| {
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: namespace '{}' erased", NAMESPACE);
                    Ok(())
                }
                Err(_) => Err(StorageError::IoError),
            }
        }
    }
}
