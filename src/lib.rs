//! # Checklist Store
//!
//! Local persistence for field-inspection checklists. An inspector walks a
//! solar-park area, records a status, notes, GPS position and photos per
//! check point, and the resulting checklist is kept on the device until it is
//! exported or mailed.
//!
//! Photos dominate the size of a checklist, so they are never stored inside the
//! checklist record. Each image is written to its own entry in an `images`
//! table under `<checklist id>_<item id>_<index>`, while the `checklists` table
//! only holds metadata and per-item image counts. Reading a checklist by id
//! puts the images back in place; listing checklists does not touch them.
//!
//! ## Features
//!
//! - **LMDB-based storage**: both tables live in one environment and each save
//!   is a single write transaction
//! - **Explicit store object**: [`DocumentStore`](document_store::DocumentStore)
//!   is built once and passed around; an in-memory backend is available for tests
//! - **Lazy, awaited initialization**: operations wait for the backend to open
//! - **FFI surface**: C-compatible functions returning JSON envelopes for
//!   mobile hosts
//!
//! ## Quick Start
//!
//! ```no_run
//! use checklist_store::checklist_model::{Checklist, ImageRecord, ItemTemplate};
//! use checklist_store::config::StoreConfig;
//! use checklist_store::document_store::{BackendKind, DocumentStore};
//!
//! # async fn demo() -> checklist_store::error::Result<()> {
//! let store = DocumentStore::open(BackendKind::Lmdb(StoreConfig::named("inspections"))).await?;
//!
//! let template = [ItemTemplate::new("1.1", "Fence", "Fence intact", "Yearly")];
//! let mut checklist = Checklist::new("Solbakken", "3", &template);
//! checklist.add_image("1.1", ImageRecord::new("data:image/jpeg;base64,/9j/4AAQ"));
//! store.save(&checklist).await?;
//!
//! let loaded = store.get_checklist_by_id(&checklist.id).await?;
//! assert_eq!(loaded, Some(checklist));
//! # Ok(())
//! # }
//! ```
//!
//! ## FFI Functions
//!
//! - [`create_store`] - Open (or create) a store and return a handle
//! - [`save_checklist`] - Insert or replace a checklist
//! - [`get_checklist_by_id`] - Load one checklist with its images
//! - [`get_all_checklists`] - List all checklists without images
//! - [`delete_checklist`] - Delete a checklist and its images
//! - [`clear_all_checklists`] - Empty the store
//! - [`close_store`] - Close the store and release the handle
//! - [`free_c_string`] - Release a string returned by any of the above

pub mod app_response;
pub mod backend;
pub mod checklist_model;
pub mod config;
pub mod document_store;
pub mod error;
pub mod export;
pub mod stored_record;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};

use crate::app_response::AppResponse;
use crate::checklist_model::Checklist;
use crate::config::StoreConfig;
use crate::document_store::{BackendKind, DocumentStore};

/// A store plus the runtime that drives it, owned by the C caller.
pub struct StoreHandle {
    runtime: tokio::runtime::Runtime,
    store: DocumentStore,
}

/// Opens the store named `name` (directory `<name>.lmdb`), creating it if needed.
///
/// Returns a handle on success or a null pointer on failure. The handle must be
/// released with [`close_store`].
///
/// # Errors
///
/// Returns null if:
/// - `name` is null or not valid UTF-8
/// - the runtime cannot be started
/// - the LMDB environment cannot be opened
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut StoreHandle {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            warn!("Failed to start runtime: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = StoreConfig::named(name_str);
    info!("Attempting to create/open checklist store at: {}", config.path.display());

    match runtime.block_on(DocumentStore::open(BackendKind::Lmdb(config))) {
        Ok(store) => {
            info!("Checklist store initialized successfully");
            Box::into_raw(Box::new(StoreHandle { runtime, store }))
        }
        Err(e) => {
            warn!("Failed to initialize checklist store: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Saves the checklist given as JSON, replacing any checklist with the same id.
///
/// Images may be included inline in each item; they are stored separately.
/// The `Ok` response carries the checklist id.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_checklist(handle: *mut StoreHandle, json_ptr: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "save_checklist") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let checklist: Checklist = match serde_json::from_str(&json_str) {
        Ok(c) => c,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid checklist JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match handle.runtime.block_on(handle.store.save(&checklist)) {
        Ok(()) => response_to_c_string(&AppResponse::success(checklist.id)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Loads a checklist with all images attached.
///
/// Responds `NotFound` when the id was never saved, which is distinct from a
/// `DatabaseError`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_checklist_by_id(handle: *mut StoreHandle, id: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "get_checklist_by_id") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match handle.runtime.block_on(handle.store.get_checklist_by_id(&id_str)) {
        Ok(Some(checklist)) => response_to_c_string(&AppResponse::ok_json(&checklist)),
        Ok(None) => {
            let error = AppResponse::NotFound(format!("No checklist found with id: {id_str}"));
            response_to_c_string(&error)
        }
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Lists every checklist as stored: metadata and image counts, no image data.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all_checklists(handle: *mut StoreHandle) -> *const c_char {
    let handle = match handle_ref(handle, "get_all_checklists") {
        Ok(h) => h,
        Err(err) => return err,
    };

    match handle.runtime.block_on(handle.store.get_all_checklists()) {
        Ok(records) => response_to_c_string(&AppResponse::ok_json(&records)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Deletes a checklist and every image stored for it.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_checklist(handle: *mut StoreHandle, id: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "delete_checklist") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(err) => return err,
    };

    match handle.runtime.block_on(handle.store.delete_checklist(&id_str)) {
        Ok(true) => response_to_c_string(&AppResponse::success("Checklist deleted successfully")),
        Ok(false) => {
            let not_found = AppResponse::NotFound(format!("No checklist found with id: {id_str}"));
            response_to_c_string(&not_found)
        }
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Removes all checklists and images. The store stays open.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_checklists(handle: *mut StoreHandle) -> *const c_char {
    let handle = match handle_ref(handle, "clear_all_checklists") {
        Ok(h) => h,
        Err(err) => return err,
    };

    match handle.runtime.block_on(handle.store.clear_all()) {
        Ok(()) => response_to_c_string(&AppResponse::success("All checklists cleared successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Closes the store and frees the handle. The pointer is invalid afterwards.
///
/// Useful before a host hot restart, so the LMDB environment is released
/// before the next [`create_store`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(handle: *mut StoreHandle) -> *const c_char {
    if handle.is_null() {
        let error = AppResponse::BadRequest("Null handle passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let handle = unsafe { Box::from_raw(handle) };
    handle.runtime.block_on(handle.store.close());
    drop(handle);

    response_to_c_string(&AppResponse::success("Checklist store closed successfully"))
}

/// Frees a string previously returned by this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_c_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn handle_ref<'a>(handle: *mut StoreHandle, operation: &str) -> Result<&'a StoreHandle, *const c_char> {
    match unsafe { handle.as_ref() } {
        Some(h) => Ok(h),
        None => {
            let error = AppResponse::BadRequest(format!("Null handle passed to {operation}"));
            Err(response_to_c_string(&error))
        }
    }
}

/// Serializes `response` into a heap-allocated C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string argument, turning null or invalid UTF-8 into a
/// ready-to-return `BadRequest` response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
