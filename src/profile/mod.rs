//! Method profile data.
//!
//! Profile records tell the compiler which methods actually ran in the training
//! scenarios. With profile-guided compilation enabled the driver only roots those
//! methods; everything else is compiled only when referenced.
//!
//! Decoding of the profile file format happens outside of this crate. A
//! [`ProfileSource`] hands decoded records to the [`ProfileDataManager`], which loads
//! each module's data on first request and shares it afterwards.
//!
//! # Examples
//!
//! ```rust
//! use readytorun::metadata::{token::ModuleId, typesystem::{MethodAttributes, ModuleDesc, TypeKind}};
//! use readytorun::profile::{MethodProfileData, MethodProfilingDataFlags, ProfileDataManager, RecordedProfile};
//!
//! let mut app = ModuleDesc::new(ModuleId(0), "App");
//! let program = app.define_type("App", "Program", TypeKind::Class);
//! let main = app.define_method(&program, "Main", MethodAttributes::STATIC);
//!
//! let manager = ProfileDataManager::new(RecordedProfile::new(vec![MethodProfileData::new(
//!     main.clone(),
//!     MethodProfilingDataFlags::READ_METHOD_CODE,
//!     1,
//! )]));
//! assert!(manager.is_executed(&main)?);
//! # Ok::<(), readytorun::Error>(())
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bitflags::bitflags;
use log::debug;

use crate::{
    metadata::{token::ModuleId, typesystem::MethodDesc},
    Result,
};

bitflags! {
    /// What a training run observed about a method
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MethodProfilingDataFlags: u32 {
        /// The method's code was executed
        const READ_METHOD_CODE = 1 << 0;
        /// The method descriptor was read
        const READ_METHOD_DESC = 1 << 1;
        /// The method ran exactly once, typically a static constructor
        const RUN_ONCE_METHOD = 1 << 2;
        /// The method never ran
        const RUN_NEVER_METHOD = 1 << 3;
        /// Stored data of the method was accessed
        const METHOD_STORED_DATA_ACCESS = 1 << 4;
        /// The method descriptor was written
        const WRITE_METHOD_DESC = 1 << 5;
        /// Keep the method out of the hot code region
        const EXCLUDE_HOT_METHOD_CODE = 1 << 6;
        /// Keep the method out of the cold code region
        const EXCLUDE_COLD_METHOD_CODE = 1 << 7;
        /// Do not precompile the method
        const DISABLE_METHOD_CODE = 1 << 8;
        /// The method's precode was read
        const READ_METHOD_PRECODE = 1 << 9;
        /// The method's precode was written
        const WRITE_METHOD_PRECODE = 1 << 10;
        /// The method's GC info was read
        const READ_GC_INFO = 1 << 11;
        /// GC info shared with other methods was read
        const COMMON_READ_GC_INFO = 1 << 12;
    }
}

/// Profile record of one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodProfileData {
    /// The profiled method
    pub method: MethodDesc,
    /// Observations
    pub flags: MethodProfilingDataFlags,
    /// Bit set of the training scenarios the method appeared in
    pub scenario_mask: u32,
}

impl MethodProfileData {
    /// Creates a record
    #[must_use]
    pub fn new(method: MethodDesc, flags: MethodProfilingDataFlags, scenario_mask: u32) -> Self {
        MethodProfileData {
            method,
            flags,
            scenario_mask,
        }
    }

    /// Returns `true` if the method ran and precompiling it was not disabled
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.flags
            .intersects(MethodProfilingDataFlags::READ_METHOD_CODE | MethodProfilingDataFlags::RUN_ONCE_METHOD)
            && !self
                .flags
                .intersects(MethodProfilingDataFlags::RUN_NEVER_METHOD | MethodProfilingDataFlags::DISABLE_METHOD_CODE)
    }
}

/// Profile records of one module, one per method
#[derive(Debug, Default)]
pub struct ProfileData {
    partial: bool,
    methods: HashMap<MethodDesc, MethodProfileData>,
}

impl ProfileData {
    /// Builds the profile of a module from decoded records.
    ///
    /// `partial` marks profiles that only cover part of the module's methods.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if two records describe the same method.
    pub fn new(records: impl IntoIterator<Item = MethodProfileData>, partial: bool) -> Result<Self> {
        let mut methods = HashMap::new();
        for record in records {
            if methods.contains_key(&record.method) {
                return Err(malformed_error!("duplicate profile data for method '{}'", record.method));
            }
            methods.insert(record.method.clone(), record);
        }
        Ok(ProfileData { partial, methods })
    }

    /// A profile without records
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the profile does not cover the whole module
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// The record of `method`, if it was profiled
    #[must_use]
    pub fn method_profile_data(&self, method: &MethodDesc) -> Option<&MethodProfileData> {
        self.methods.get(method)
    }

    /// All records, in no particular order
    pub fn methods(&self) -> impl Iterator<Item = &MethodProfileData> {
        self.methods.values()
    }

    /// Number of profiled methods
    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Returns `true` if nothing was profiled
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Supplies decoded profile data per module
pub trait ProfileSource: Send + Sync {
    /// Loads the profile of `module`; modules without data yield an empty profile
    ///
    /// # Errors
    /// Returns an error if the module's profile data is inconsistent.
    fn load(&self, module: ModuleId) -> Result<ProfileData>;
}

/// Source that never has profile data
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProfile;

impl ProfileSource for NoProfile {
    fn load(&self, _module: ModuleId) -> Result<ProfileData> {
        Ok(ProfileData::empty())
    }
}

/// Source serving records decoded ahead of time, split by the owning module
#[derive(Debug, Default, Clone)]
pub struct RecordedProfile {
    records: Vec<MethodProfileData>,
    partial: bool,
}

impl RecordedProfile {
    /// Creates a source over complete profiles
    #[must_use]
    pub fn new(records: Vec<MethodProfileData>) -> Self {
        RecordedProfile {
            records,
            partial: false,
        }
    }

    /// Marks the recorded profiles as covering only part of their modules
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }
}

impl ProfileSource for RecordedProfile {
    fn load(&self, module: ModuleId) -> Result<ProfileData> {
        let records = self
            .records
            .iter()
            .filter(|record| record.method.module() == Some(module))
            .cloned();
        ProfileData::new(records, self.partial)
    }
}

/// Demand-loaded profile data shared across compilations.
///
/// Each module's data is loaded once, under the cache lock, and handed out as a
/// shared reference after the lock is released.
pub struct ProfileDataManager {
    source: Box<dyn ProfileSource>,
    modules: Mutex<HashMap<ModuleId, Arc<ProfileData>>>,
}

impl std::fmt::Debug for ProfileDataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileDataManager").finish_non_exhaustive()
    }
}

impl Default for ProfileDataManager {
    fn default() -> Self {
        ProfileDataManager::new(NoProfile)
    }
}

impl ProfileDataManager {
    /// Creates a manager loading from `source`
    #[must_use]
    pub fn new(source: impl ProfileSource + 'static) -> Self {
        ProfileDataManager {
            source: Box::new(source),
            modules: Mutex::new(HashMap::new()),
        }
    }

    /// Profile data of `module`, loaded on first request.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the cache lock is poisoned and any error
    /// of the source.
    pub fn data_for_module(&self, module: ModuleId) -> Result<Arc<ProfileData>> {
        let mut modules = lock!(self.modules);
        if let Some(data) = modules.get(&module) {
            return Ok(Arc::clone(data));
        }

        let data = Arc::new(self.source.load(module)?);
        debug!("loaded profile data of {module}: {} methods", data.len());
        modules.insert(module, Arc::clone(&data));
        Ok(data)
    }

    /// The record of `method`, if its module's profile has one
    ///
    /// # Errors
    /// See [`ProfileDataManager::data_for_module`].
    pub fn method_profile_data(&self, method: &MethodDesc) -> Result<Option<MethodProfileData>> {
        let Some(module) = method.module() else {
            return Ok(None);
        };
        Ok(self.data_for_module(module)?.method_profile_data(method).cloned())
    }

    /// Returns `true` if the profile reports `method` as executed
    ///
    /// # Errors
    /// See [`ProfileDataManager::data_for_module`].
    pub fn is_executed(&self, method: &MethodDesc) -> Result<bool> {
        Ok(self
            .method_profile_data(method)?
            .is_some_and(|record| record.is_executed()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        metadata::typesystem::MethodAttributes,
        test::factories::corelib,
        Error,
    };

    #[test]
    fn duplicate_records_are_malformed() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);

        let records = vec![
            MethodProfileData::new(method.clone(), MethodProfilingDataFlags::READ_METHOD_CODE, 1),
            MethodProfileData::new(method, MethodProfilingDataFlags::RUN_ONCE_METHOD, 2),
        ];
        assert!(matches!(ProfileData::new(records, false), Err(Error::Malformed { .. })));
    }

    #[test]
    fn execution_flags() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);

        let ran = MethodProfileData::new(method.clone(), MethodProfilingDataFlags::READ_METHOD_CODE, 1);
        let never = MethodProfileData::new(method.clone(), MethodProfilingDataFlags::RUN_NEVER_METHOD, 1);
        let disabled = MethodProfileData::new(
            method,
            MethodProfilingDataFlags::READ_METHOD_CODE | MethodProfilingDataFlags::DISABLE_METHOD_CODE,
            1,
        );
        assert!(ran.is_executed());
        assert!(!never.is_executed());
        assert!(!disabled.is_executed());
    }

    struct CountingSource(AtomicUsize);

    impl ProfileSource for CountingSource {
        fn load(&self, _module: ModuleId) -> Result<ProfileData> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(ProfileData::empty())
        }
    }

    #[test]
    fn modules_are_loaded_once() {
        let manager = ProfileDataManager::new(CountingSource(AtomicUsize::new(0)));
        let first = manager.data_for_module(ModuleId(3)).unwrap();
        let second = manager.data_for_module(ModuleId(3)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        manager.data_for_module(ModuleId(4)).unwrap();
        assert_eq!(manager.modules.lock().unwrap().len(), 2);
    }

    #[test]
    fn recorded_profiles_split_by_module() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);
        let other = lib.module.define_method(&object, "Equals", MethodAttributes::VIRTUAL);

        let manager = ProfileDataManager::new(RecordedProfile::new(vec![MethodProfileData::new(
            method.clone(),
            MethodProfilingDataFlags::READ_METHOD_CODE,
            1,
        )]));
        assert!(manager.is_executed(&method).unwrap());
        assert!(!manager.is_executed(&other).unwrap());
        assert_eq!(manager.data_for_module(ModuleId(0)).unwrap().len(), 1);
        assert!(manager.data_for_module(ModuleId(9)).unwrap().is_empty());
    }

    #[test]
    fn shared_across_threads() {
        let mut lib = corelib();
        let object = lib.object.clone();
        let method = lib.module.define_method(&object, "ToString", MethodAttributes::VIRTUAL);
        let manager = Arc::new(ProfileDataManager::new(RecordedProfile::new(vec![
            MethodProfileData::new(method.clone(), MethodProfilingDataFlags::READ_METHOD_CODE, 1),
        ])));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let method = method.clone();
                std::thread::spawn(move || manager.is_executed(&method).unwrap())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
